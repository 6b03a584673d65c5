//! Retry with exponential backoff for one-shot API calls.
//!
//! Used for requests made once per process (such as resolving the active
//! company), where a transient network or server failure should not abort
//! startup. Errors are classified by message: transient HTTP and network
//! failures are retried, authentication and client errors fail at once.
//!
//! ```rust,ignore
//! use helpmetest_mcp::retry::{RetryConfig, execute_with_retry};
//!
//! let config = RetryConfig::default();
//! let user = execute_with_retry(&config, || async {
//!     Ok::<_, anyhow::Error>(fetch_user().await?)
//! }).await?;
//! ```

use rand::RngExt;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// `initial_delay * backoff_factor^attempt`
    #[default]
    ExponentialBackoff,
    FixedDelay,
    Immediate,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub policy: RetryPolicy,
    /// Spread delays by ±50% so many clients do not retry in lockstep.
    pub jitter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            policy: RetryPolicy::ExponentialBackoff,
            jitter_enabled: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Delay before retry `attempt` (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = match self.policy {
            RetryPolicy::ExponentialBackoff => {
                let multiplier = self.backoff_factor.powi(attempt as i32);
                let delay_ms = self.initial_delay.as_millis() as f64 * multiplier;
                Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64)
            }
            RetryPolicy::FixedDelay => self.initial_delay,
            RetryPolicy::Immediate => Duration::ZERO,
        };
        std::cmp::min(delay, self.max_delay)
    }

    pub fn delay_for_attempt_with_jitter(&self, attempt: u32) -> Duration {
        let base_delay = self.delay_for_attempt(attempt);
        if !self.jitter_enabled || base_delay.is_zero() {
            return base_delay;
        }

        let base_ms = base_delay.as_millis() as f64;
        let jitter_range = base_ms * 0.5;
        let jitter = rand::rng().random_range(-jitter_range..jitter_range);
        Duration::from_millis((base_ms + jitter).max(0.0) as u64)
    }
}

const RETRYABLE_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "network is unreachable",
    "no route to host",
    "dns error",
    "error sending request",
    "http 429",
    "http 500",
    "http 502",
    "http 503",
    "http 504",
];

const PERMANENT_PATTERNS: &[&str] = &[
    "http 400",
    "http 401",
    "http 403",
    "http 404",
    "unauthorized",
    "forbidden",
    "invalid token",
    "builder error",
    "relative url without a base",
];

/// Whether `error_message` describes a transient failure.
///
/// Permanent patterns win over retryable ones; unknown errors are not retried.
pub fn is_retryable_error(error_message: &str) -> bool {
    let lower = error_message.to_lowercase();
    if PERMANENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return false;
    }
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// The whole error chain is used for classification, so wrapped transport
/// errors are recognised.
pub async fn execute_with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, anyhow::Error>>,
{
    let total_attempts = 1 + config.max_retries;
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..total_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                let error_msg = format!("{err:#}");
                if !is_retryable_error(&error_msg) {
                    tracing::debug!(
                        "Non-retryable error on attempt {}: {}",
                        attempt + 1,
                        error_msg
                    );
                    return Err(err);
                }

                let retries_remaining = total_attempts.saturating_sub(attempt + 1);
                if retries_remaining == 0 {
                    last_error = Some(err);
                    break;
                }

                let delay = config.delay_for_attempt_with_jitter(attempt);
                tracing::warn!(
                    "Retryable error on attempt {} ({}ms delay, {} retries left): {}",
                    attempt + 1,
                    delay.as_millis(),
                    retries_remaining,
                    error_msg
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Retry exhausted with no error captured")))
}
