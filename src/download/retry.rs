//! Bounded retry with a fixed delay for transfer attempts.
//!
//! This module provides the [`RetryPolicy`] and [`fetch_with_retry`], which
//! wraps a single transfer attempt in a retry loop.
//!
//! # Overview
//!
//! Each attempt is either a success, a transient transport failure that may be
//! retried (network error, timeout, HTTP 5xx, 408 or 429), or a permanent
//! failure that is surfaced at once (other 4xx, bad URL, bad credentials).
//!
//! - `retry_limit == 0` means "no retry": the first transport error is
//!   returned unchanged.
//! - `retry_limit == n` allows `n` additional attempts, `n + 1` in total.
//!   Running out yields [`DownloadError::TransferExhausted`] carrying the
//!   last error.
//!
//! Attempts are spaced by a fixed delay; there is no backoff and no jitter.
//!
//! # Example
//!
//! ```
//! use bulkget_core::download::{DownloadError, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::with_retry_limit(2);
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//!
//! match policy.should_retry(&error, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::DownloadError;

/// Default delay between attempts (100 ms).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the transfer after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the transfer.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry configuration: how many extra attempts, and how far apart.
///
/// # Default Values
///
/// - `retry_limit`: 0 (single attempt)
/// - `delay`: 100 ms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first failure.
    retry_limit: u32,

    /// Fixed pause between attempts.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_limit: 0,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    #[must_use]
    pub fn new(retry_limit: u32, delay: Duration) -> Self {
        Self { retry_limit, delay }
    }

    /// Creates a policy with a custom retry limit and the default delay.
    #[must_use]
    pub fn with_retry_limit(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            ..Self::default()
        }
    }

    /// Returns the number of additional attempts allowed.
    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns the total number of attempts this policy permits.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed with `error`.
    #[instrument(skip(self, error), fields(retry_limit = self.retry_limit))]
    pub fn should_retry(&self, error: &DownloadError, attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if self.retry_limit == 0 {
            return RetryDecision::DoNotRetry {
                reason: "retries disabled".to_string(),
            };
        }

        if attempt > self.retry_limit {
            debug!(attempt, max = self.max_attempts(), "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("retry limit ({}) exhausted", self.retry_limit),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}

/// Runs `attempt_fn` until it succeeds or the policy gives up.
///
/// `attempt_fn` receives the 1-indexed attempt number. On success the value
/// is returned together with the number of attempts used.
///
/// # Errors
///
/// - the attempt's own error when it is not retryable (see
///   [`DownloadError::is_retryable`]), or when `retry_limit` is 0
/// - [`DownloadError::TransferExhausted`] when all `retry_limit + 1`
///   attempts failed
#[instrument(skip(policy, attempt_fn), fields(retry_limit = policy.retry_limit()))]
pub async fn fetch_with_retry<T, F, Fut>(
    url: &str,
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Result<(T, u32), DownloadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting transfer");

        let error = match attempt_fn(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => error,
        };

        match policy.should_retry(&error, attempt) {
            RetryDecision::Retry {
                delay,
                attempt: next_attempt,
            } => {
                warn!(
                    url,
                    attempt = next_attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying transfer"
                );
                tokio::time::sleep(delay).await;
            }
            RetryDecision::DoNotRetry { reason } => {
                debug!(url, %reason, "not retrying transfer");
                if error.is_retryable() && policy.retry_limit() > 0 {
                    return Err(DownloadError::transfer_exhausted(url, attempt, error));
                }
                return Err(error);
            }
        }
    }
}
