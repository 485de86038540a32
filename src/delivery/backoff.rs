//! Exponential retry backoff for failed deliveries

use std::time::Duration;

use rand::Rng;

/// Backoff policy for retrying a failed delivery.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`, with optional symmetric jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Deterministic policy with the given base delay.
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before the retry following failure number `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        let base_ms = self.base_delay.as_millis() as f64;
        let raw = base_ms * 2f64.powi(exponent as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter_factor > 0.0 {
            let jitter_range = capped * self.jitter_factor.min(1.0);
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(final_delay as u64)
    }
}
