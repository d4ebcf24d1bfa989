//! Storage error types.
//!
//! Used by mapping store implementations and their callers.

use thiserror::Error;

/// Errors that can occur when using storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing database is unavailable or rejected the statement. Retryable.
    #[error("Database error: {0}")]
    Database(String),
    /// A record breaks the mapping invariants and was not written.
    #[error("Invalid record: {0}")]
    Invalid(String),
}

impl StorageError {
    /// True when repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}
