//! Observable events of the master
//!
//! Events are explicit and typed; the string form is the `event` field of
//! every log line.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Startup begins
    BootStart,
    /// Configuration loaded and validated
    ConfigLoaded,
    /// Seed rows loaded into the store
    SeedLoaded,
    /// HTTP listener accepting requests
    Serving,
    /// Startup failed
    BootFailed,

    // Resource lifecycle
    ResourceCreated,
    ResourceDisabled,
    ResourceEnabled,
    ResourceRemoved,
    AccountCanceled,
    PasswordSet,
    DisableLogRemoved,

    // Authorization
    /// An operation was denied
    AccessDenied,

    // Transactions
    /// A transaction rolled back and its invalidations were discarded
    TransactionAborted,

    // Invalidation fan-out
    /// Committed invalidations delivered to subscribers
    InvalidationFlushed,
    /// A subscriber could not be reached and was dropped
    DeliveryFailed,
    SessionOpened,
    SessionClosed,

    // Shared infrastructure
    /// Unreferenced shared infrastructure deleted
    SharedReclaimed,
    /// Best-effort cleanup failed, left for the reconciliation sweep
    ReclaimDeferred,
    /// Periodic reconciliation sweep finished
    ReconcileSweep,

    // Daemons
    /// A host daemon call failed or timed out
    DaemonUnreachable,
    /// A host daemon rebuilt its configuration
    DaemonRebuilt,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "BOOT_START",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SeedLoaded => "SEED_LOADED",
            Event::Serving => "HOSTMASTER_SERVING",
            Event::BootFailed => "BOOT_FAILED",

            Event::ResourceCreated => "RESOURCE_CREATED",
            Event::ResourceDisabled => "RESOURCE_DISABLED",
            Event::ResourceEnabled => "RESOURCE_ENABLED",
            Event::ResourceRemoved => "RESOURCE_REMOVED",
            Event::AccountCanceled => "ACCOUNT_CANCELED",
            Event::PasswordSet => "PASSWORD_SET",
            Event::DisableLogRemoved => "DISABLE_LOG_REMOVED",

            Event::AccessDenied => "ACCESS_DENIED",

            Event::TransactionAborted => "TRANSACTION_ABORTED",

            Event::InvalidationFlushed => "INVALIDATION_FLUSHED",
            Event::DeliveryFailed => "DELIVERY_FAILED",
            Event::SessionOpened => "SESSION_OPENED",
            Event::SessionClosed => "SESSION_CLOSED",

            Event::SharedReclaimed => "SHARED_RECLAIMED",
            Event::ReclaimDeferred => "RECLAIM_DEFERRED",
            Event::ReconcileSweep => "RECONCILE_SWEEP",

            Event::DaemonUnreachable => "DAEMON_UNREACHABLE",
            Event::DaemonRebuilt => "DAEMON_REBUILT",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::BootFailed => Severity::Fatal,
            Event::DeliveryFailed | Event::ReclaimDeferred | Event::DaemonUnreachable => {
                Severity::Warn
            }
            Event::AccessDenied | Event::TransactionAborted => Severity::Info,
            Event::InvalidationFlushed | Event::SessionOpened | Event::SessionClosed => {
                Severity::Trace
            }
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
