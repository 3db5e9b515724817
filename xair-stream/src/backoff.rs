//! Bounded exponential backoff for failed sends

use std::time::Duration;

use rand::Rng;

use crate::config::SyncConfig;

/// Retry delay policy: `base * 2^(attempt - 1)`, spread by jitter, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.retry_backoff_base,
            config.retry_backoff_max,
            config.retry_jitter,
        )
    }

    /// Delay before retry number `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Delay before retry number `attempt`, spread by random jitter
    ///
    /// Paths that fail together retry at different times.
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.base_delay(attempt);
        if self.jitter == 0.0 {
            return nominal;
        }

        let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        nominal.mul_f64(1.0 + unit * self.jitter).min(self.max)
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
