//! Error types for the relay engine.

use relay_core::TransportError;
use storage::StorageError;
use thiserror::Error;

/// Failure of one relay action (one target, or a whole event when no target was reached).
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dispatcher is shut down")]
    DispatcherClosed,
}

impl RelayError {
    /// True when the same event may succeed if it is delivered again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Storage(e) => e.is_retryable(),
            Self::DispatcherClosed => false,
        }
    }
}
