//! Retry/backoff configuration.

use std::time::Duration;

/// Configuration for one retry session.
///
/// Supplied per call site and immutable for the duration of the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied per attempt: `base * multiplier^(attempt-1)`.
    /// Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
    /// Spread each delay uniformly over ±50% to avoid thundering herds.
    pub jitter: bool,
}

impl RetryPolicy {
    /// Set the attempt cap (clamped to at least 1).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}
