use crate::config::ReconnectConfig;
use std::cmp;
use std::time::Duration;

/// Bounded exponential backoff for socket reconnects
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_ms.max(1)),
            max: Duration::from_millis(config.max_ms.max(config.base_ms.max(1))),
            max_attempts: config.max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or None once the attempt budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(limit) = self.max_attempts {
            if self.attempt >= limit {
                return None;
            }
        }
        let exponent = cmp::min(self.attempt, 16);
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.base.saturating_mul(1u32 << exponent);
        Some(cmp::min(delay, self.max))
    }

    /// Consecutive failed attempts so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
