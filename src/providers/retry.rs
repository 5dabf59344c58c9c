//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! [`with_retry`] is the single place where retry policy lives. The throttle
//! wraps it around rate-limited attempts
//! ([`Throttle::run_with_retry`](crate::Throttle::run_with_retry)) and the
//! orchestrator calls that once per provider candidate.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::telemetry;
use crate::{Result, TolkError};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff with optional jitter:
///
/// ```rust
/// # use tolk::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry when the error carries no hint.
    /// Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to scale delays by a random factor in `[0.9, 1.1]`. Default: true.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Backoff after the given failed attempt (1-indexed), before jitter.
    ///
    /// `base * 2^(attempt-1)` where `base` is the error's `retry_after` hint
    /// or `initial_delay`. Capped at `max_delay`, but never below the hint.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let base = retry_after.unwrap_or(self.initial_delay);
        let exp = attempt.saturating_sub(1).min(31);
        let delay = base.saturating_mul(1u32 << exp);
        delay.min(self.max_delay.max(base))
    }

    /// Backoff with jitter applied when enabled.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt, retry_after);
        if self.jitter {
            delay.mul_f64(rand::random_range(0.9..=1.1))
        } else {
            delay
        }
    }
}

/// Per-call context for [`with_retry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptContext<'a> {
    /// Label for logs and metrics, normally the provider name.
    pub provider: &'a str,
    /// Aborts backoff sleeps with [`TolkError::Cancelled`].
    pub cancel: Option<&'a CancellationToken>,
    /// Raise retry logging from `warn` to `info` with extra detail.
    pub debug: bool,
}

impl<'a> AttemptContext<'a> {
    pub fn new(provider: &'a str) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn cancel(mut self, token: Option<&'a CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }
}

/// Execute an async operation with retry logic.
///
/// Retries transient errors (as classified by [`TolkError::is_transient()`])
/// up to `config.max_attempts` total tries. Permanent errors are returned
/// immediately; after the final attempt the last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    ctx: AttemptContext<'_>,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        if !err.is_transient() || attempt >= max_attempts {
            return Err(err);
        }

        metrics::counter!(telemetry::RETRIES_TOTAL, "provider" => ctx.provider.to_owned())
            .increment(1);
        let delay = config.effective_delay(attempt, err.retry_after());
        if ctx.debug {
            info!(
                provider = ctx.provider,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                retry_after_ms = err.retry_after().map(|d| d.as_millis() as u64),
                error = %err,
                "retrying after transient error"
            );
        } else {
            warn!(
                provider = ctx.provider,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after transient error"
            );
        }

        match ctx.cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => return Err(TolkError::Cancelled),
                }
            }
            None => tokio::time::sleep(delay).await,
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(100))
            .jitter(false);
        assert_eq!(config.delay_for_attempt(1, None), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2, None), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3, None), Duration::from_millis(400));
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10, None), Duration::from_secs(5));
    }

    #[test]
    fn hint_replaces_base_delay() {
        let config = RetryConfig::new().initial_delay(Duration::from_millis(100));
        let hint = Some(Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1, hint), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2, hint), Duration::from_secs(4));
    }

    #[test]
    fn hint_above_cap_is_honoured() {
        let config = RetryConfig::new().max_delay(Duration::from_secs(1));
        let hint = Some(Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(3, hint), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(1000))
            .jitter(true);
        for _ in 0..100 {
            let d = config.effective_delay(1, None);
            assert!(d >= Duration::from_millis(900), "{d:?}");
            assert!(d <= Duration::from_millis(1100), "{d:?}");
        }
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let config = RetryConfig::new().max_delay(Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(u32::MAX, None), Duration::from_secs(30));
    }
}
