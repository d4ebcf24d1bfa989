//! # Relay engine
//!
//! Decides, for every source event, what has to happen in each target chat and drives it
//! through the transport while keeping the mapping store consistent.
//!
//! - [`governor`] – retry with backoff for rate limits and transient failures
//! - [`engine`] – `handle_new` / `handle_edit` state machine per source message and target
//! - [`reconciler`] – backlog reconciliation of history that predates the relay
//! - [`dispatch`] – ordered, gated event lanes feeding the engine

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod governor;
pub mod reconciler;

pub use dispatch::{DispatchHandle, Dispatcher, RelayEvent};
pub use engine::{
    Disposition, IgnoreReason, RelayEngine, RelayReport, TargetAction, TargetOutcome,
};
pub use error::RelayError;
pub use governor::{Governor, RetryHint, RetryPolicy, Retryable};
pub use reconciler::{BacklogConfig, BacklogStrategy, Reconciler};
