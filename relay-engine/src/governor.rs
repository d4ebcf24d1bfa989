//! Rate/failure governor: retry with backoff, shared by the engine and the reconciler.
//!
//! Every failure is classified through [`Retryable`]:
//!
//! - rate limit: sleep exactly the requested duration, then retry (bounded by
//!   `max_rate_limit_waits`)
//! - transient: retry up to `max_retries`, delay `base * 2^(n-1)` capped at `max_delay`
//!   (or a fixed `base` when `exponential` is off)
//! - permanent, or retries exhausted: the error goes back to the caller

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use relay_core::TransportError;
use tracing::warn;

use crate::error::RelayError;

/// How a failure should be treated by [`Governor::execute_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Remote asked to wait this long before retrying.
    After(Duration),
    Transient,
    Permanent,
}

/// Errors the governor knows how to classify.
pub trait Retryable {
    fn retry_hint(&self) -> RetryHint;
}

impl Retryable for TransportError {
    fn retry_hint(&self) -> RetryHint {
        match self {
            TransportError::RateLimited(wait) => RetryHint::After(*wait),
            TransportError::Network(_) => RetryHint::Transient,
            _ => RetryHint::Permanent,
        }
    }
}

impl Retryable for RelayError {
    fn retry_hint(&self) -> RetryHint {
        match self {
            RelayError::Transport(e) => e.retry_hint(),
            RelayError::Storage(e) if e.is_retryable() => RetryHint::Transient,
            _ => RetryHint::Permanent,
        }
    }
}

/// Retry bounds for single calls and for whole-event redelivery.
///
/// Backoff for transient failures: `base_delay * 2^(retry - 1)` capped at `max_delay`.
/// With the defaults: 1s, 2s, 4s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after a transient failure (not counting the first attempt).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Exponential when true, fixed `base_delay` otherwise.
    pub exponential: bool,
    /// How many rate-limit waits one call may absorb before the signal is returned.
    pub max_rate_limit_waits: u32,
    /// Times an event whose targets failed retryably is handed to the engine again.
    pub max_redeliveries: u32,
    pub redelivery_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential: true,
            max_rate_limit_waits: 1,
            max_redeliveries: 3,
            redelivery_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Wraps transport calls (or whole idempotent passes) with the retry policy.
#[derive(Debug, Clone, Default)]
pub struct Governor {
    policy: RetryPolicy,
}

impl Governor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until it succeeds, fails permanently, or the policy is exhausted.
    /// `label` only names the operation in logs.
    pub async fn execute_with_backoff<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut retries = 0u32;
        let mut waits = 0u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match err.retry_hint() {
                RetryHint::After(wait) if waits < self.policy.max_rate_limit_waits => {
                    waits += 1;
                    warn!(operation = label, wait_secs = wait.as_secs_f64(), "Rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                RetryHint::Transient if retries < self.policy.max_retries => {
                    retries += 1;
                    let delay = self.policy.delay_for(retries);
                    warn!(
                        operation = label,
                        error = %err,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delay_for_exponential_capped() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(250));
        assert_eq!(p.delay_for(40), Duration::from_millis(250));
    }

    #[test]
    fn test_delay_for_fixed() {
        let p = RetryPolicy {
            exponential: false,
            ..policy(5)
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(4), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_exact_duration_then_retries_once() {
        let governor = Governor::new(policy(3));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<u32, TransportError> = governor
            .execute_with_backoff("send", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TransportError::RateLimited(Duration::from_secs(7)))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_is_returned() {
        let governor = Governor::new(policy(3));
        let calls = AtomicU32::new(0);

        let result: Result<(), TransportError> = governor
            .execute_with_backoff("send", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::RateLimited(Duration::from_secs(2)))
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            TransportError::RateLimited(Duration::from_secs(2))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_up_to_bound() {
        let governor = Governor::new(policy(2));
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), TransportError> = governor
            .execute_with_backoff("edit", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Network("connection reset".into()))
            })
            .await;

        assert!(matches!(result, Err(TransportError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_not_retried() {
        let governor = Governor::new(policy(5));
        let calls = AtomicU32::new(0);

        let result: Result<(), TransportError> = governor
            .execute_with_backoff("delete", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Api("chat not found".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let governor = Governor::new(policy(3));
        let calls = AtomicU32::new(0);

        let result: Result<&str, TransportError> = governor
            .execute_with_backoff("send", || async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(TransportError::Network("timeout".into())),
                    _ => Ok("sent"),
                }
            })
            .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_relay_error_hints() {
        let storage = RelayError::Storage(storage::StorageError::Database("locked".into()));
        assert_eq!(storage.retry_hint(), RetryHint::Transient);
        let invalid = RelayError::Storage(storage::StorageError::Invalid("bad".into()));
        assert_eq!(invalid.retry_hint(), RetryHint::Permanent);
        let limited = RelayError::Transport(TransportError::RateLimited(Duration::from_secs(1)));
        assert_eq!(limited.retry_hint(), RetryHint::After(Duration::from_secs(1)));
    }
}
