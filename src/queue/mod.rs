//! Durable retry queue for board messages.
//!
//! [`PersistentQueue`] is the sole owner of queue mutation. Every mutating call
//! runs under one lock and rewrites the full snapshot under
//! [`QUEUE_KEY`](crate::storage::QUEUE_KEY).

mod models;
mod persistent;

pub use models::{
    MessagePriority, MessageStatus, QueueConfig, QueueError, QueueStats, QueuedMessage,
};
pub use persistent::PersistentQueue;
