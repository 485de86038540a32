//! Immutable delivery configuration and presets.

use std::time::Duration;

use super::{BackoffPolicy, DeliveryStrategy};
use crate::queue::QueueConfig;

/// Settings fixed at orchestrator construction.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfiguration {
    pub strategy: DeliveryStrategy,
    /// Failed attempts allowed before a message becomes terminal
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub base_delay: Duration,
    /// Cap on any single retry delay
    pub max_backoff: Duration,
    /// Jitter factor applied to retry delays (0.0 is deterministic)
    pub backoff_jitter: f64,
    pub max_queue_size: usize,
    pub max_message_age: Duration,
    /// Pause between consecutive deliveries in one loop
    pub pacing_delay: Duration,
    /// Safety-net timer that re-triggers the loop
    pub poll_interval: Duration,
    /// Timeout applied to each board API call
    pub request_timeout: Duration,
    /// How often stale records are swept
    pub cleanup_interval: Duration,
}

impl Default for DeliveryConfiguration {
    fn default() -> Self {
        Self {
            strategy: DeliveryStrategy::Queued,
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            backoff_jitter: 0.0,
            max_queue_size: 50,
            max_message_age: Duration::from_secs(24 * 3600),
            pacing_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl DeliveryConfiguration {
    /// Multi-user boards: hold messages on conflict, more retries.
    pub fn conservative() -> Self {
        Self {
            strategy: DeliveryStrategy::ConflictAware,
            max_retries: 5,
            ..Self::default()
        }
    }

    /// Single-user boards: skip conflict checks, fail fast.
    pub fn aggressive() -> Self {
        Self {
            strategy: DeliveryStrategy::Optimistic,
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    pub fn balanced() -> Self {
        Self {
            strategy: DeliveryStrategy::Queued,
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::default()),
            "conservative" => Some(Self::conservative()),
            "aggressive" => Some(Self::aggressive()),
            "balanced" => Some(Self::balanced()),
            _ => None,
        }
    }

    pub fn with_strategy(mut self, strategy: DeliveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: self.base_delay,
            max_delay: self.max_backoff,
            jitter_factor: self.backoff_jitter,
        }
    }

    /// Queue settings derived from this configuration.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_queue_size: self.max_queue_size,
            max_message_age: self.max_message_age,
            max_retries: self.max_retries,
            backoff: self.backoff(),
        }
    }
}
