//! Reconnection Policy
//!
//! Exponential backoff with jitter between gateway reconnection attempts.
//! Delays double from `initial_delay` up to `max_delay`; the attempt budget
//! is restored once a connection delivers a live event.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Same delays, different attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Same budget, different delays and no jitter.
    #[must_use]
    pub const fn with_fixed_backoff(
        mut self,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self.jitter_factor = 0.0;
        self
    }
}

/// Backoff state for one subscription.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Fresh policy with a full attempt budget.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.jittered(self.backoff(self.attempts));
        self.attempts = self.attempts.saturating_add(1);
        Some(delay)
    }

    /// Restore the full budget after a connection proved live.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts used since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether no attempts remain.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts
    }

    /// Un-jittered delay for the given zero-based attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let spread = self.config.jitter_factor.clamp(0.0, 1.0);
        if spread <= 0.0 {
            return delay;
        }
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + offset))
            .unwrap_or(delay)
            .max(Duration::from_millis(1))
    }
}
