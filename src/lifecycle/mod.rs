//! # Resource Lifecycle
//!
//! Units of work, DisableLog bookkeeping, the generic removal executor and
//! the manager exposing Create / Disable / Enable / Remove.

pub mod disable_log;
mod manager;
mod remove;
mod request;
mod work;

pub use manager::{LifecycleManager, OwnerInfo, PasswordChange};
pub use remove::RemovalReport;
pub use request::{CreateRequest, CreditCardUpdate};
pub use work::UnitOfWork;
