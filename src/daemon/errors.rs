//! # Daemon Errors

use thiserror::Error;

use crate::errors::MasterError;
use crate::store::RowId;

/// Result type for daemon calls
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Failures talking to a per-host daemon
#[derive(Debug, Clone, Error)]
pub enum DaemonError {
    // ==================
    // Transport Errors
    // ==================
    /// No daemon address configured for the host
    #[error("No daemon configured for host #{0}")]
    UnknownHost(RowId),

    #[error("Daemon for host #{host} unreachable: {reason}")]
    Unreachable { host: RowId, reason: String },

    #[error("Daemon for host #{host} did not answer within {millis}ms")]
    Timeout { host: RowId, millis: u64 },

    // ==================
    // Protocol Errors
    // ==================
    /// Reply could not be decoded
    #[error("Malformed reply from host #{host}: {reason}")]
    Protocol { host: RowId, reason: String },

    /// Daemon answered with an error
    #[error("Daemon for host #{host} rejected {operation}: {message}")]
    Rejected {
        host: RowId,
        operation: String,
        message: String,
    },
}

impl DaemonError {
    /// Get error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownHost(_) => "DAEMON_UNKNOWN_HOST",
            Self::Unreachable { .. } => "DAEMON_UNREACHABLE",
            Self::Timeout { .. } => "DAEMON_TIMEOUT",
            Self::Protocol { .. } => "DAEMON_PROTOCOL_ERROR",
            Self::Rejected { .. } => "DAEMON_REJECTED",
        }
    }

    /// Host the failed call was addressed to
    pub fn host(&self) -> RowId {
        match self {
            Self::UnknownHost(host) => *host,
            Self::Unreachable { host, .. }
            | Self::Timeout { host, .. }
            | Self::Protocol { host, .. }
            | Self::Rejected { host, .. } => *host,
        }
    }
}

impl From<DaemonError> for MasterError {
    fn from(err: DaemonError) -> Self {
        MasterError::Io(err.to_string())
    }
}
