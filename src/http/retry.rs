//! Retry policy with exponential backoff and jitter

use std::time::Duration;

use rand::Rng;

/// Backoff schedule for transient request failures.
///
/// The delay before attempt `n` (zero-based) is
/// `min(max_delay, base_delay * backoff_factor^n)`, scaled by a random
/// factor in `1 ± jitter_factor`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: crate::constants::retry::MAX_ATTEMPTS,
            base_delay: Duration::from_millis(crate::constants::retry::BASE_DELAY_MS),
            max_delay: Duration::from_millis(crate::constants::retry::MAX_DELAY_MS),
            backoff_factor: crate::constants::retry::BACKOFF_FACTOR,
            jitter_factor: crate::constants::retry::JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    /// Stricter schedule used by the video endpoint, which throttles hard.
    pub fn video() -> Self {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(180),
            backoff_factor: 3.0,
            jitter_factor: 0.15,
        }
    }

    /// Jittered delay before the given zero-based retry attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt as i32);
        let raw = self.base_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter: f64 = rand::rng().random_range(-self.jitter_factor..=self.jitter_factor);
        Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
    }
}
