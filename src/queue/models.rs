//! Queue data models and error types

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::board::BoardMessage;
use crate::delivery::BackoffPolicy;
use crate::storage::StorageError;

/// Configuration for the persistent queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of records held at once
    pub max_queue_size: usize,
    /// Records older than this (and not sending) are evicted
    pub max_message_age: Duration,
    /// Failed attempts allowed before a record becomes terminal
    pub max_retries: u32,
    /// Delay schedule between attempts
    pub backoff: BackoffPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            max_message_age: Duration::from_secs(24 * 3600),
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Delivery status of a queued record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting to be sent (possibly inside a backoff window)
    Pending,
    /// Handed to the delivery loop
    Sending,
    /// Terminal until explicitly retried
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sending => "sending",
            MessageStatus::Failed => "failed",
        }
    }
}

/// Caller-assigned importance. Informational; dequeue order is insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A unit of work: one post to the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: Uuid,
    pub message: BoardMessage,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Absent means eligible now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Parked after a prevented conflict, awaiting manual resolution
    #[serde(default)]
    pub on_hold: bool,
}

impl QueuedMessage {
    /// Wrap a board message as a new pending record.
    pub fn new(message: BoardMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            status: MessageStatus::Pending,
            retry_count: 0,
            enqueued_at: Utc::now(),
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
            priority: MessagePriority::Normal,
            metadata: HashMap::new(),
            on_hold: false,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Message text.
    pub fn text(&self) -> &str {
        &self.message.text
    }

    /// Whether the record may be dequeued at `now`.
    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        self.status == MessageStatus::Pending
            && !self.on_hold
            && self.next_retry_at.map_or(true, |at| at <= now)
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Utc::now())
    }

    /// Whether the record is older than `max_age` at `now`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        chrono::Duration::from_std(max_age)
            .map(|max_age| now.signed_duration_since(self.enqueued_at) > max_age)
            .unwrap_or(false)
    }
}

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Queue already holds `max` records
    #[error("Queue is full ({size}/{max})")]
    QueueFull { size: usize, max: usize },

    /// A pending record already carries the same text
    #[error("An identical message is already pending")]
    DuplicateMessage,

    /// No record with this id
    #[error("Message {0} not found")]
    NotFound(Uuid),

    /// Operation not allowed in the record's current status
    #[error("Message {id} is {status} and cannot be retried")]
    InvalidState { id: Uuid, status: &'static str },

    /// Snapshot could not be written
    #[error("Failed to persist queue: {0}")]
    Persistence(#[from] StorageError),
}

/// Statistics about the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    /// Pending records, including those waiting out a backoff
    pub pending: usize,
    /// Pending records eligible right now
    pub ready: usize,
    pub sending: usize,
    pub failed: usize,
    /// Pending records parked after a conflict
    pub held: usize,
    pub max_queue_size: usize,
}
