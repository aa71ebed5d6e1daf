//! # Bearer Tokens
//!
//! HS256 tokens whose subject is a principal username. Validation is
//! stateless; the principal itself is loaded from the store per request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::errors::{AuthError, AuthResult};

/// Claims carried by a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal username
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Token configuration
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl: Duration,
    pub issuer: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "CHANGE_THIS_SECRET_IN_PRODUCTION".to_string(),
            ttl: Duration::minutes(60),
            issuer: "hostmaster".to_string(),
        }
    }
}

/// Issues and validates bearer tokens
#[derive(Clone)]
pub struct TokenManager {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenManager {
    pub fn new(config: TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issue a token for `username`
    pub fn issue(&self, username: &str) -> AuthResult<String> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.ttl).timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::TokenGenerationFailed)
    }

    /// Validate a token and return its claims
    pub fn validate(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);

        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::MalformedToken,
            })
    }

    /// Validate an `Authorization` header value and return the username
    pub fn username_from_header(&self, header: Option<&str>) -> AuthResult<String> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::AuthenticationRequired)?;
        Ok(self.validate(token)?.sub)
    }
}
