//! # Observability
//!
//! Structured JSON logging of typed [`Event`]s and a counter registry
//! served at `/observability/metrics`. Logging never fails an operation.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
