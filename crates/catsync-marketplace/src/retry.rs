//! Bounded retry with exponential backoff for marketplace requests.
//!
//! [`Backoff`] is the attempt counter and delay schedule on its own, with no
//! I/O, so the termination bound can be tested without a server.
//! [`retry_with_backoff`] drives it around a fallible async operation.
//!
//! Retriable errors:
//! - [`MarketplaceError::Transient`]: HTTP 429 or 5xx.
//! - [`MarketplaceError::Http`] for timeouts and connection failures.
//!
//! Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::MarketplaceError;

/// Attempt budget and delay schedule for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_millis(4000),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_millis(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }
}

/// Backoff schedule for a single request.
///
/// | failed attempts | delay before next attempt (defaults) |
/// |-----------------|--------------------------------------|
/// | 1               | 400 ms                               |
/// | 2               | 800 ms                               |
/// | 3               | 1 600 ms                             |
/// | 4               | 3 200 ms                             |
/// | 5               | exhausted                            |
///
/// Delays double from `initial_delay` and never exceed `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            next_delay: policy.initial_delay,
        }
    }

    /// Records a failed attempt. Returns the delay to wait before the next
    /// attempt, or `None` once the attempt budget is spent.
    pub fn on_failure(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let delay = self.next_delay.min(self.policy.max_delay);
        self.next_delay = delay.saturating_mul(2).min(self.policy.max_delay);
        Some(delay)
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

pub(crate) fn is_retriable(err: &MarketplaceError) -> bool {
    match err {
        MarketplaceError::Transient { .. } => true,
        MarketplaceError::Http(e) => e.is_timeout() || e.is_connect(),
        MarketplaceError::Config(_)
        | MarketplaceError::Remote { .. }
        | MarketplaceError::ExhaustedRetries { .. }
        | MarketplaceError::Deserialize { .. }
        | MarketplaceError::InvalidUrl { .. } => false,
    }
}

/// Runs `operation` until it succeeds, fails with a non-retriable error, or
/// the policy's attempt budget is spent.
///
/// # Errors
///
/// Non-retriable errors are returned as-is. Exhaustion is reported as
/// [`MarketplaceError::ExhaustedRetries`] wrapping the last failure.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, MarketplaceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketplaceError>>,
{
    let mut backoff = Backoff::new(policy);
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retriable(&err) => return Err(err),
            Err(err) => err,
        };

        let Some(delay) = backoff.on_failure() else {
            return Err(MarketplaceError::ExhaustedRetries {
                attempts: backoff.attempts(),
                last: Box::new(err),
            });
        };

        tracing::warn!(
            attempt = backoff.attempts(),
            max_attempts = policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient marketplace error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}
