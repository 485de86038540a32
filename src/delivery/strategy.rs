//! Delivery strategies: how conflicts are checked and handled.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Policy selecting conflict checking and prevention behavior.
///
/// A strategy is fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStrategy {
    /// Queue and check for conflicts, last write wins
    #[default]
    Queued,
    /// No queue intent, no conflict checks
    Immediate,
    /// Queue, check, and hold messages when the board changed underneath us
    ConflictAware,
    /// Queue without conflict checks
    Optimistic,
    /// Inline retries only
    RetryOnly,
}

impl DeliveryStrategy {
    pub const ALL: [DeliveryStrategy; 5] = [
        DeliveryStrategy::Queued,
        DeliveryStrategy::Immediate,
        DeliveryStrategy::ConflictAware,
        DeliveryStrategy::Optimistic,
        DeliveryStrategy::RetryOnly,
    ];

    /// Whether to fetch the board and compare it with the cache before posting.
    pub fn should_check_conflicts(&self) -> bool {
        matches!(self, Self::Queued | Self::ConflictAware)
    }

    /// Whether a detected conflict stops the post.
    pub fn should_prevent_conflicts(&self) -> bool {
        matches!(self, Self::ConflictAware)
    }

    /// Advisory: the orchestrator always queues.
    pub fn should_queue_messages(&self) -> bool {
        matches!(self, Self::Queued | Self::ConflictAware | Self::Optimistic)
    }

    /// Configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Immediate => "immediate",
            Self::ConflictAware => "conflict_aware",
            Self::Optimistic => "optimistic",
            Self::RetryOnly => "retry_only",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Queued => "Queued Delivery",
            Self::Immediate => "Immediate Delivery",
            Self::ConflictAware => "Conflict-Aware",
            Self::Optimistic => "Optimistic",
            Self::RetryOnly => "Retry-Only",
        }
    }

    /// Parse a configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for DeliveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeliveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown delivery strategy: {}", s))
    }
}
