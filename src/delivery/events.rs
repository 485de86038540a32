//! Delivery notifications.
//!
//! Observers are fire-and-forget: callbacks return nothing and must not
//! block. Every callback defaults to a no-op so implementors pick only the
//! ones they need.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{DeliveryError, QueueState};
use crate::board::BoardSnapshot;
use crate::queue::QueuedMessage;

/// Receiver of delivery notifications.
pub trait DeliveryObserver: Send + Sync {
    /// An attempt is about to start.
    fn will_send(&self, _message: &QueuedMessage) {}

    /// The message reached the board.
    fn did_send(&self, _message: &QueuedMessage) {}

    /// The attempt failed; the message was rescheduled, held, or failed.
    fn did_fail(&self, _message: &QueuedMessage, _error: &DeliveryError) {}

    /// The message was removed by the caller.
    fn did_cancel(&self, _id: Uuid) {}

    /// The board changed underneath a pending message.
    fn did_detect_conflict(&self, _message: &QueuedMessage, _current: &BoardSnapshot) {}

    /// New board content was synced into the cache.
    fn content_changed(&self, _snapshot: &BoardSnapshot) {}

    /// The aggregate queue state changed.
    fn state_changed(&self, _state: QueueState) {}
}

/// Serializable delivery event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryEvent {
    WillSend {
        id: Uuid,
        text: String,
        retry_count: u32,
    },
    DidSend {
        id: Uuid,
        text: String,
    },
    DidFail {
        id: Uuid,
        error: String,
        kind: String,
        retryable: bool,
    },
    DidCancel {
        id: Uuid,
    },
    ConflictDetected {
        id: Uuid,
        current_text: String,
    },
    ContentChanged {
        text: String,
        captured_at: DateTime<Utc>,
    },
    StateChanged {
        state: QueueState,
    },
}

impl DeliveryEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WillSend { .. } => "will_send",
            Self::DidSend { .. } => "did_send",
            Self::DidFail { .. } => "did_fail",
            Self::DidCancel { .. } => "did_cancel",
            Self::ConflictDetected { .. } => "conflict_detected",
            Self::ContentChanged { .. } => "content_changed",
            Self::StateChanged { .. } => "state_changed",
        }
    }
}

/// Observer that republishes notifications on a broadcast channel.
pub struct EventBroadcaster {
    tx: broadcast::Sender<DeliveryEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, event: DeliveryEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl DeliveryObserver for EventBroadcaster {
    fn will_send(&self, message: &QueuedMessage) {
        self.publish(DeliveryEvent::WillSend {
            id: message.id,
            text: message.text().to_string(),
            retry_count: message.retry_count,
        });
    }

    fn did_send(&self, message: &QueuedMessage) {
        self.publish(DeliveryEvent::DidSend {
            id: message.id,
            text: message.text().to_string(),
        });
    }

    fn did_fail(&self, message: &QueuedMessage, error: &DeliveryError) {
        self.publish(DeliveryEvent::DidFail {
            id: message.id,
            error: error.to_string(),
            kind: error.kind().to_string(),
            retryable: error.is_retryable(),
        });
    }

    fn did_cancel(&self, id: Uuid) {
        self.publish(DeliveryEvent::DidCancel { id });
    }

    fn did_detect_conflict(&self, message: &QueuedMessage, current: &BoardSnapshot) {
        self.publish(DeliveryEvent::ConflictDetected {
            id: message.id,
            current_text: current.text(),
        });
    }

    fn content_changed(&self, snapshot: &BoardSnapshot) {
        self.publish(DeliveryEvent::ContentChanged {
            text: snapshot.text(),
            captured_at: snapshot.captured_at,
        });
    }

    fn state_changed(&self, state: QueueState) {
        self.publish(DeliveryEvent::StateChanged { state });
    }
}
