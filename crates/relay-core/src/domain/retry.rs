//! Retry policy: decides how often and how long to wait.

use std::time::Duration;

/// Retry policy for transient failures.
///
/// Used by the agent client (fixed backoff on timeouts) and by the dispatcher
/// when pushing background results.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier. `1.0` means a fixed delay.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    /// `retries` extra attempts after the first one.
    pub fn with_retries(retries: u32, delay: Duration) -> Self {
        Self::fixed(retries.saturating_add(1), delay)
    }

    /// Single attempt, never retry.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next attempt: `base_delay * multiplier^(attempts - 1)`.
    ///
    /// # Arguments
    /// * `attempts` - Number of attempts already made (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(attempts.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(2, Duration::from_secs(2))
    }
}
