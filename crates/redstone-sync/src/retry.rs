//! Bounded retry of remote calls
//!
//! Retryable [`RemoteError`]s (network, timeout, 5xx, 429) are retried with
//! jittered exponential backoff up to `max_attempts` calls in total. Any
//! other error is returned at once. A `Retry-After` longer than the backoff
//! ceiling ends the retries early: the record stays dirty and the next run
//! picks it up. Cancellation is observed while a call is in flight and
//! while sleeping.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use redstone_core::config::SyncConfig;
use redstone_core::ports::RemoteError;

use crate::backoff::Backoff;

/// How often and how patiently a remote call is retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Per-record policy from the `sync` configuration section
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.push_max_attempts,
            Backoff::new(config.retry_base_delay(), config.retry_max_delay(), true),
        )
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::new(1, Backoff::new(Duration::ZERO, Duration::ZERO, false))
    }
}

/// Why a retried call did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryFailure {
    /// Still failing with a retryable error after `attempts` calls
    Exhausted { attempts: u32, last: RemoteError },
    /// Failed with an error retrying cannot fix
    Fatal(RemoteError),
    /// The cancellation token fired
    Cancelled,
}

/// Runs `f` until it succeeds, fails fatally, runs out of attempts or is
/// cancelled
pub async fn with_retry<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
            result = f() => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(RetryFailure::Fatal(err)),
            Err(err) => err,
        };

        if attempt >= policy.max_attempts {
            warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
            return Err(RetryFailure::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = match err.retry_after() {
            Some(requested) if requested > policy.backoff.max() => {
                warn!(
                    operation,
                    attempt,
                    retry_after_secs = requested.as_secs(),
                    "Server asked to wait longer than the retry ceiling, deferring"
                );
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Some(requested) => requested,
            None => policy.backoff.delay(attempt - 1),
        };

        warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient error, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
