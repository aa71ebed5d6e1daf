//! # Master Errors
//!
//! The error taxonomy every administrative operation reports through.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for master operations
pub type MasterResult<T> = Result<T, MasterError>;

/// Errors surfaced to administrative callers
#[derive(Debug, Clone, Error)]
pub enum MasterError {
    // ==================
    // Caller Errors
    // ==================
    /// Authorization failure; never retried
    #[error("Access denied: {0}")]
    Deny(String),

    /// Lifecycle precondition violated; nothing was applied
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Dangling reference
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request fields failed type-specific validation
    #[error("Invalid request: {0}")]
    Validation(String),

    // ==================
    // Infrastructure Errors
    // ==================
    /// Remote daemon unreachable
    #[error("Daemon unreachable: {0}")]
    Io(String),

    /// Store conflict or failure; the whole operation rolled back
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MasterError {
    pub fn deny(msg: impl Into<String>) -> Self {
        Self::Deny(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Deny(_) => "ACCESS_DENIED",
            Self::Precondition(_) => "PRECONDITION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Io(_) => "DAEMON_UNREACHABLE",
            Self::Transaction(_) => "TRANSACTION_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Deny(_) => 403,
            Self::NotFound(_) => 404,
            Self::Precondition(_) => 409,
            Self::Io(_) => 502,
            Self::Transaction(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the whole operation from scratch
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl From<StoreError> for MasterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RowNotFound { .. } => Self::NotFound(e.to_string()),
            StoreError::MalformedRow { .. } | StoreError::InvalidSeed(_) => {
                Self::Internal(e.to_string())
            }
            StoreError::WriteFailed { .. } | StoreError::Poisoned => {
                Self::Transaction(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;

    #[test]
    fn test_status_codes() {
        assert_eq!(MasterError::deny("x").status_code(), 403);
        assert_eq!(MasterError::precondition("x").status_code(), 409);
        assert_eq!(MasterError::not_found("x").status_code(), 404);
        assert_eq!(MasterError::Transaction("x".into()).status_code(), 503);
    }

    #[test]
    fn test_only_transaction_errors_retry() {
        assert!(MasterError::Transaction("conflict".into()).is_retryable());
        assert!(!MasterError::deny("no").is_retryable());
        assert!(!MasterError::precondition("no").is_retryable());
    }

    #[test]
    fn test_store_error_mapping() {
        let missing: MasterError = StoreError::RowNotFound {
            table: Table::Packages,
            id: 3,
        }
        .into();
        assert!(matches!(missing, MasterError::NotFound(_)));

        let failed: MasterError = StoreError::WriteFailed {
            table: Table::Packages,
            reason: "disk".into(),
        }
        .into();
        assert!(failed.is_retryable());
    }
}
