//! # Invalidation Errors

use thiserror::Error;
use uuid::Uuid;

use crate::errors::MasterError;

/// Result type for session management
pub type InvalidationResult<T> = Result<T, InvalidationError>;

/// Errors raised by the broadcaster's session registry
#[derive(Debug, Clone, Error)]
pub enum InvalidationError {
    // ==================
    // Session Errors
    // ==================
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// The receiving side of the session went away
    #[error("Session closed: {0}")]
    SessionClosed(Uuid),

    // ==================
    // Request Errors
    // ==================
    /// A subscription asked for more than the principal may see
    #[error("Invalid interest: {0}")]
    InvalidInterest(String),

    // ==================
    // Internal Errors
    // ==================
    #[error("Lock poisoned")]
    Poisoned,
}

impl InvalidationError {
    /// Get error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::InvalidInterest(_) => "INVALID_INTEREST",
            Self::Poisoned => "INTERNAL_ERROR",
        }
    }
}

impl From<InvalidationError> for MasterError {
    fn from(err: InvalidationError) -> Self {
        match err {
            InvalidationError::SessionNotFound(_) | InvalidationError::SessionClosed(_) => {
                MasterError::NotFound(err.to_string())
            }
            InvalidationError::InvalidInterest(_) => MasterError::Validation(err.to_string()),
            InvalidationError::Poisoned => MasterError::Internal(err.to_string()),
        }
    }
}
