//! Reconnection policy.

use std::time::Duration;

/// How long to wait between attempts and when to stop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor per attempt. `1.0` keeps the interval fixed.
    pub backoff_multiplier: f64,
    /// Consecutive failed opens before giving up (None = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.0,
            max_attempts: Some(5),
        }
    }
}

impl ReconnectConfig {
    /// Fixed-interval policy with a ceiling.
    #[must_use]
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay.max(Duration::from_secs(30)),
            backoff_multiplier: 1.0,
            max_attempts,
        }
    }

    /// Wait before open number `attempt`, counting from 1 (0 reads as 1).
    ///
    /// Grows by `backoff_multiplier` per attempt and never exceeds
    /// `max_delay`. A delay that does not fit in a [`Duration`] is clamped.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether the ceiling still allows an open after `failures` failed ones
    /// in a row.
    #[must_use]
    pub const fn should_reconnect(&self, failures: u32) -> bool {
        !matches!(self.max_attempts, Some(max) if failures >= max)
    }
}
