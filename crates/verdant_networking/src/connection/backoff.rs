//! Exponential reconnect backoff.

use std::time::Duration;

use verdant_core::ReconnectionConfig;

/// `min(base * 2^attempt, max)`, giving up after `max_retries` failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_retries: u32,
}

impl Backoff {
    /// Creates a backoff policy.
    #[must_use]
    pub const fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max,
            max_retries,
        }
    }

    /// Policy from the reconnection config (seconds).
    #[must_use]
    pub const fn from_config(config: &ReconnectionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.base_delay),
            Duration::from_secs(config.max_delay),
            config.max_retries,
        )
    }

    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Consecutive failures tolerated before giving up.
    #[must_use]
    #[inline]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ReconnectionConfig::default())
    }
}
