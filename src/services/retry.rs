//! Bounded retry with exponential backoff and jitter
//!
//! Generic combinator used by the processing engine for transient database
//! failures. The caller supplies a classifier; non-retryable errors return
//! immediately.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Initial backoff duration (doubles on each retry)
    pub initial_backoff: Duration,
    /// Maximum backoff duration to cap exponential growth
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Retry a fallible async operation with exponential backoff and jitter.
///
/// The delay before retry `n` is `initial * 2^(n-1)` capped at
/// `max_backoff`, with half the delay randomized so contending workers
/// spread out against a contested portfolio.
///
/// # Returns
/// * `Ok(T)` if the operation succeeds within `max_attempts`
/// * `Err(E)` with the last error once attempts are exhausted, or
///   immediately when `is_retryable` returns false
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation: F,
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    context: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        context = %context,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !is_retryable(&e) {
                    debug!(
                        context = %context,
                        attempt = attempt,
                        error = %e,
                        "Non-retryable error, giving up"
                    );
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    warn!(
                        context = %context,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = jittered(backoff);
                warn!(
                    context = %context,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = delay.as_millis(),
                    error = %e,
                    "Operation failed, retrying with backoff"
                );

                sleep(delay).await;

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

/// Half-jitter: keep half the delay deterministic, randomize the rest.
fn jittered(backoff: Duration) -> Duration {
    let half = backoff.as_millis() as u64 / 2;
    Duration::from_millis(half + fastrand::u64(0..=half.max(1)))
}
