//! Reconnect backoff with jitter.
//!
//! Retry `n` (0-indexed) waits `min(cap, base * growth^n) + jitter`,
//! with jitter drawn uniformly from `[0, jitter)`.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff policy with a bounded retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor per retry (values below 1.0 are treated as 1.0).
    pub growth: f64,
    /// Upper bound on the deterministic part of the delay.
    pub cap: Duration,
    /// Exclusive upper bound of the random jitter added on top.
    pub jitter: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            growth: 1.5,
            cap: Duration::from_millis(30_000),
            jitter: Duration::from_millis(1000),
            max_retries: 10,
        }
    }
}

impl BackoffPolicy {
    /// The capped, jitter-free delay for retry `retry`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let base_ms = self.base.as_secs_f64() * 1000.0;
        let cap_ms = self.cap.as_secs_f64() * 1000.0;
        let exp = i32::try_from(retry).unwrap_or(i32::MAX);
        let ms = (base_ms * self.growth.max(1.0).powi(exp)).min(cap_ms);
        Duration::from_secs_f64(ms / 1000.0)
    }

    /// Delay for retry `retry` with an explicit jitter sample in `[0, 1)`.
    pub fn delay_with_jitter(&self, retry: u32, sample: f64) -> Duration {
        let sample = sample.clamp(0.0, 1.0);
        self.base_delay(retry) + self.jitter.mul_f64(sample)
    }

    /// Delay for retry `retry` with a fresh random jitter.
    pub fn delay(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.base_delay(retry) + jitter
    }

    /// Whether `retries` consecutive failures use up the budget.
    pub fn is_exhausted(&self, retries: u32) -> bool {
        retries >= self.max_retries
    }
}
