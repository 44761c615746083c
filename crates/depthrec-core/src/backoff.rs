//! Exponential reconnect backoff.
//!
//! The delay starts at `min`, doubles after every consecutive failure and is
//! capped at `max`. A successful connection resets it to `min`.

use std::time::Duration;

pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_millis(250);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { min: DEFAULT_MIN_BACKOFF, max: DEFAULT_MAX_BACKOFF }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let config = BackoffConfig { min: config.min, max: config.max.max(config.min) };
        Self { current: config.min, config, attempt: 0 }
    }

    /// Delay to wait before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.config.max);
        self.attempt += 1;
        delay
    }

    /// Back to the minimum after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.config.min;
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
