//! Error types for transport operations.
//!
//! [`TransportError`] is returned by every [`crate::Transport`] call. The variants separate
//! transient failures (rate limit, network) from permanent ones so callers can decide whether
//! to retry.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single transport call (send, edit, delete, history).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote asked us to wait before the next request.
    #[error("Rate limited, retry after {0:?}")]
    RateLimited(Duration),

    #[error("Network error: {0}")]
    Network(String),

    /// The target message does not exist (anymore).
    #[error("Message not found: {0}")]
    NotFound(String),

    /// An edit carried exactly the content the target message already has.
    #[error("Message not modified")]
    NotModified,

    /// Any other rejection by the remote (chat inaccessible, bad request...). Not retried.
    #[error("API error: {0}")]
    Api(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// True for errors that may succeed when the same call is repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Network(_))
    }

    /// Wait duration requested by the remote, if this is a rate-limit signal.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(d) => Some(*d),
            _ => None,
        }
    }
}

/// Result type for transport operations; uses [`TransportError`].
pub type Result<T> = std::result::Result<T, TransportError>;
