//! Retry with linear backoff
//!
//! Attempt `n` failing with a retryable error waits `retry_delay * n` before
//! attempt `n + 1`. A 429 carrying `retry-after` waits exactly that long instead.
//! `max_retries` is the total number of attempts, the first one included.

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, HttpConfig};
use crate::error::{AtlassianApiError, ErrorCode, Result};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Statuses retried in addition to those the error classification marks transient
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Configuration for retry behavior
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for RetryConfig"),
    builder_type(doc = "Builder for RetryConfig", vis = "pub"),
    build_method(doc = "Build the RetryConfig")
)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Base delay, multiplied by the attempt number
    #[builder(default = DEFAULT_RETRY_DELAY)]
    pub retry_delay: Duration,

    /// HTTP statuses that are always retried
    #[builder(default = DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect())]
    pub retryable_status_codes: HashSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&HttpConfig> for RetryConfig {
    fn from(http: &HttpConfig) -> Self {
        Self::builder()
            .max_retries(http.max_retries)
            .retry_delay(http.retry_delay)
            .build()
    }
}

impl RetryConfig {
    /// Delay before the attempt following failed attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

/// Runs an operation until it succeeds, fails permanently, or runs out of attempts
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from its configuration
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `err` may succeed on another attempt
    #[must_use]
    pub fn should_retry(&self, err: &AtlassianApiError) -> bool {
        err.is_retryable()
            || err
                .status
                .is_some_and(|s| self.config.retryable_status_codes.contains(&s))
    }

    /// How long to wait after failed attempt `attempt`
    #[must_use]
    pub fn delay_after(&self, err: &AtlassianApiError, attempt: u32) -> Duration {
        match err.retry_after {
            Some(delay) if err.code == ErrorCode::RateLimitExceeded && !delay.is_zero() => delay,
            _ => self.config.delay_for_attempt(attempt),
        }
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// The closure receives the 1-based attempt number and must build a fresh
    /// request each time.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once all
    /// attempts are used.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && self.should_retry(&err) => {
                    let delay = self.delay_after(&err, attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying after error: {}",
                        err.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
