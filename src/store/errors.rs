//! # Store Errors
//!
//! Error types for the relational store.

use thiserror::Error;

use super::table::Table;
use super::RowId;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Relational store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Row does not exist
    #[error("{table} #{id} does not exist")]
    RowNotFound { table: Table, id: RowId },

    /// A write was rejected by the store (I/O failure, injected fault)
    #[error("write to {table} failed: {reason}")]
    WriteFailed { table: Table, reason: String },

    /// Row payload is not a JSON object
    #[error("malformed row for {table}: {reason}")]
    MalformedRow { table: Table, reason: String },

    /// Seed data could not be loaded
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// The store lock was poisoned by a panicking transaction
    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Whether retrying the whole transaction may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::WriteFailed { .. } | StoreError::Poisoned)
    }
}
