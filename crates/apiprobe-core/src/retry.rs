//! Retry policy with clamped bounds and capped exponential backoff

use std::time::Duration;

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_CAP: u32 = 10;

/// Floor for the first backoff delay.
pub const MIN_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// No single backoff sleep exceeds this.
pub const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from raw user input.
    ///
    /// `max_retries` is clamped to `0..=10` (negative becomes 0) and
    /// `initial_delay` is raised to at least 100ms.
    #[must_use]
    pub fn new(max_retries: i64, initial_delay: Duration) -> Self {
        let max_retries = u32::try_from(max_retries.clamp(0, i64::from(MAX_RETRIES_CAP)))
            .unwrap_or(MAX_RETRIES_CAP);
        Self {
            max_retries,
            initial_delay: initial_delay.max(MIN_INITIAL_DELAY),
            max_delay: MAX_DELAY,
        }
    }

    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, MIN_INITIAL_DELAY)
    }

    /// Sleep before the retry that follows attempt `attempt` (0-based):
    /// `min(initial_delay * 2^attempt, max_delay)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, MIN_INITIAL_DELAY)
    }
}
