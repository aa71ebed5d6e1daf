//! # Host Daemons
//!
//! The master never touches host configuration itself. It calls the
//! daemon running on each host through a [`DaemonConnector`], bounded by
//! the configured timeout, and feeds every daemon the invalidations for
//! its host.

mod connector;
mod errors;
mod operation;
mod tcp;
mod worker;

pub use connector::{DaemonClient, DaemonConnector, DaemonFuture, DaemonOutcome};
pub use errors::{DaemonError, DaemonResult};
pub use operation::DaemonOperation;
pub use tcp::TcpConnector;
pub use worker::{rebuild_plan, DaemonWorker};
