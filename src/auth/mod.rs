//! # Auth
//!
//! Bearer tokens identifying administrative clients, and Argon2 hashing of
//! passwords set through the master.

pub mod crypto;
pub mod errors;
pub mod jwt;

pub use crypto::{hash_password, verify_password};
pub use errors::{AuthError, AuthResult};
pub use jwt::{TokenClaims, TokenConfig, TokenManager};
