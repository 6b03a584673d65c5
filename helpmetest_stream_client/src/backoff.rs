use std::time::Duration;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
/// Default cap on the reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential reconnect delay with no retry limit.
///
/// The n-th consecutive failure waits `min(initial * 2^(n-1), max)`. A
/// successful connection calls [`ReconnectBackoff::reset`], so the next
/// failure starts again from `initial`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    retry_count: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl ReconnectBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            retry_count: 0,
        }
    }

    /// Consecutive failures since the last successful connection.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Delay for a given 1-based retry number, without touching the counter.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63);
        let multiplier = 1u128 << exponent;
        let delay_ms = self
            .initial_delay
            .as_millis()
            .saturating_mul(multiplier)
            .min(self.max_delay.as_millis());
        Duration::from_millis(delay_ms as u64)
    }

    /// Record a failure and return how long to wait before reconnecting.
    pub fn next_delay(&mut self) -> Duration {
        self.retry_count = self.retry_count.saturating_add(1);
        self.delay_for_retry(self.retry_count)
    }

    /// Record a successful connection.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }
}
