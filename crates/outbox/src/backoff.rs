//! Retry delay policy
//!
//! The delay after a failure grows as `base * 2^tries`, capped at `max`, then
//! scaled by a random factor in `[jitter_min, jitter_max)` so a fleet of
//! devices coming back online does not retry in lockstep.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with multiplicative jitter
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure, before jitter
    pub base: Duration,
    /// Ceiling on the pre-jitter delay
    pub max: Duration,
    /// Lower bound of the jitter factor (inclusive)
    pub jitter_min: f64,
    /// Upper bound of the jitter factor (exclusive)
    pub jitter_max: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(1800),
            jitter_min: 1.0,
            jitter_max: 1.3,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Default::default()
        }
    }

    /// Policy without jitter, for deterministic schedules
    pub fn without_jitter(mut self) -> Self {
        self.jitter_min = 1.0;
        self.jitter_max = 1.0;
        self
    }

    /// Pre-jitter delay after `tries_before` earlier failures
    pub fn nominal_delay(&self, tries_before: u32) -> Duration {
        // Clamp the exponent so the multiplier stays within u32
        let multiplier = 2_u32.saturating_pow(tries_before.min(31));
        self.base.saturating_mul(multiplier).min(self.max)
    }

    /// Jittered delay after `tries_before` earlier failures
    pub fn delay_for(&self, tries_before: u32) -> Duration {
        let nominal = self.nominal_delay(tries_before);
        let factor = if self.jitter_max > self.jitter_min {
            rand::rng().random_range(self.jitter_min..self.jitter_max)
        } else {
            self.jitter_min
        };
        nominal.mul_f64(factor)
    }

    /// Largest delay this policy can ever produce
    pub fn ceiling(&self) -> Duration {
        self.max.mul_f64(self.jitter_max.max(self.jitter_min))
    }
}
