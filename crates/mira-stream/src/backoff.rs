//! Reconnect delay policy.
//!
//! The nominal delay doubles with every consecutive failure up to a cap.
//! Jitter adds a random share on top of each nominal delay so that clients
//! dropped together by a backend restart do not reconnect in lockstep.
//! A retry never comes sooner than its nominal delay. Delays never decrease
//! between resets and never exceed the cap.

use std::time::Duration;

use mira_common::config::BackoffConfig;

/// Source of uniform samples in `[0, 1)`.
pub type JitterSource = fn() -> f64;

/// Exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
    last: Duration,
    sample: JitterSource,
}

impl Backoff {
    /// Creates a backoff starting at `base`, capped at `max`, adding up to
    /// `jitter` (0.0 to 1.0) of each nominal delay on top of it.
    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max: max.max(base),
            jitter: jitter.clamp(0.0, 1.0),
            attempt: 0,
            last: Duration::ZERO,
            sample: random_unit,
        }
    }

    /// Creates a backoff from configuration.
    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.base(), config.max(), config.jitter)
    }

    /// Replaces the random source.
    #[must_use]
    pub fn with_jitter_source(mut self, sample: JitterSource) -> Self {
        self.sample = sample;
        self
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before attempt `n` without jitter: `min(base * 2^n, max)`.
    #[must_use]
    pub fn nominal(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Returns the delay before the next reconnect and advances the attempt
    /// counter.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.nominal(self.attempt);
        let sample = (self.sample)().clamp(0.0, 1.0);
        let jittered = nominal.mul_f64(1.0 + self.jitter * sample);
        let delay = jittered.min(self.max).max(self.last);

        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// Returns to the base delay after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

/// Uniform sample in `[0, 1)` from the low random bits of a v4 UUID.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn random_unit() -> f64 {
    const MANTISSA: u64 = (1 << 53) - 1;
    let bits = uuid::Uuid::new_v4().as_u128() as u64 & MANTISSA;
    bits as f64 / (MANTISSA + 1) as f64
}
