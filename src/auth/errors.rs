//! # Auth Errors
//!
//! Error types for bearer tokens and password hashing.

use thiserror::Error;

use crate::errors::MasterError;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    // ==================
    // Token Errors
    // ==================
    /// No bearer token on the request
    #[error("Authentication required")]
    AuthenticationRequired,

    /// JWT token is malformed
    #[error("Malformed token")]
    MalformedToken,

    /// JWT token has expired
    #[error("Token expired")]
    TokenExpired,

    /// JWT signature is invalid
    #[error("Invalid token signature")]
    InvalidSignature,

    // ==================
    // Password Errors
    // ==================
    /// Empty password
    #[error("Password must not be empty")]
    EmptyPassword,

    /// Stored hash could not be parsed
    #[error("Invalid password hash")]
    InvalidHash,

    // ==================
    // Internal Errors
    // ==================
    /// Password hashing failed
    #[error("Internal error: password hashing failed")]
    HashingFailed,

    /// Token generation failed
    #[error("Internal error: token generation failed")]
    TokenGenerationFailed,
}

impl AuthError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            AuthError::MalformedToken => 400,
            AuthError::EmptyPassword => 400,

            // 401 Unauthorized
            AuthError::AuthenticationRequired => 401,
            AuthError::TokenExpired => 401,
            AuthError::InvalidSignature => 401,

            // 500 Internal Server Error
            AuthError::InvalidHash => 500,
            AuthError::HashingFailed => 500,
            AuthError::TokenGenerationFailed => 500,
        }
    }

    /// Get error code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AuthenticationRequired => "AUTH_REQUIRED",
            AuthError::MalformedToken => "MALFORMED_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::EmptyPassword => "EMPTY_PASSWORD",
            AuthError::InvalidHash => "INVALID_HASH",
            AuthError::HashingFailed => "HASHING_FAILED",
            AuthError::TokenGenerationFailed => "TOKEN_GENERATION_FAILED",
        }
    }
}

impl From<AuthError> for MasterError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmptyPassword => MasterError::Validation(err.to_string()),
            AuthError::AuthenticationRequired
            | AuthError::MalformedToken
            | AuthError::TokenExpired
            | AuthError::InvalidSignature => MasterError::Deny(err.to_string()),
            AuthError::InvalidHash | AuthError::HashingFailed | AuthError::TokenGenerationFailed => {
                MasterError::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::AuthenticationRequired.status_code(), 401);
        assert_eq!(AuthError::EmptyPassword.status_code(), 400);
        assert_eq!(AuthError::HashingFailed.status_code(), 500);
    }

    #[test]
    fn test_into_master_error() {
        let err: MasterError = AuthError::TokenExpired.into();
        assert!(matches!(err, MasterError::Deny(_)));
        let err: MasterError = AuthError::EmptyPassword.into();
        assert!(matches!(err, MasterError::Validation(_)));
    }
}
