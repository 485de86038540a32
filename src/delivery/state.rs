//! Aggregate queue state derived from the queue and connectivity.

use serde::Serialize;

use crate::queue::QueueStats;

/// What the delivery subsystem is doing, as shown to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing queued
    #[default]
    Idle,
    /// Messages waiting and the network is up
    Pending,
    /// An attempt is in flight
    Delivering,
    /// Messages waiting but offline
    WaitingForNetwork,
    /// Something needs attention (terminal failure or held conflict) and nothing is pending
    HasFailed,
}

impl QueueState {
    /// Derive the state from a queue snapshot.
    pub fn derive(stats: &QueueStats, connected: bool, delivering: bool) -> Self {
        if delivering {
            Self::Delivering
        } else if stats.pending > 0 || stats.sending > 0 {
            if connected {
                Self::Pending
            } else {
                Self::WaitingForNetwork
            }
        } else if stats.failed > 0 || stats.held > 0 {
            Self::HasFailed
        } else {
            Self::Idle
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Delivering => "delivering",
            Self::WaitingForNetwork => "waiting_for_network",
            Self::HasFailed => "has_failed",
        }
    }

    /// Numeric value exported as a gauge.
    pub fn gauge_value(&self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Pending => 1,
            Self::Delivering => 2,
            Self::WaitingForNetwork => 3,
            Self::HasFailed => 4,
        }
    }
}
