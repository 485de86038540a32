use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use super::models::{MessageStatus, QueueConfig, QueueError, QueueStats, QueuedMessage};
use crate::metrics::QueueMetrics;
use crate::storage::{load_json, save_json, StateStore, QUEUE_KEY};

/// Durable, bounded queue of board messages with status tracking.
///
/// Records are kept in insertion order. Reads and writes are serialized
/// through a single mutex so callers never observe a partially applied
/// mutation; the snapshot is persisted while the lock is held so stored
/// snapshots follow the same order as the mutations that produced them.
pub struct PersistentQueue {
    store: Arc<dyn StateStore>,
    config: QueueConfig,
    messages: Mutex<Vec<QueuedMessage>>,
    changes: watch::Sender<u64>,
}

impl PersistentQueue {
    /// Rehydrate the queue from `store`.
    ///
    /// Records left in `sending` by a previous process are reset to `pending`
    /// and stale records are evicted. An unreadable snapshot is logged and the
    /// queue starts empty.
    pub async fn load(store: Arc<dyn StateStore>, config: QueueConfig) -> Self {
        let messages: Vec<QueuedMessage> = match load_json(store.as_ref(), QUEUE_KEY).await {
            Ok(Some(messages)) => messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    backend = store.backend_name(),
                    "Failed to load queue snapshot, starting empty"
                );
                Vec::new()
            }
        };

        let (changes, _rx) = watch::channel(0);
        let queue = Self {
            store,
            config,
            messages: Mutex::new(messages),
            changes,
        };

        let recovered = queue.requeue_in_flight().await;
        let evicted = queue.cleanup_stale().await;
        {
            let messages = queue.messages.lock().await;
            queue.persist_logged(&messages).await;
            QueueMetrics::set_size(messages.len());

            tracing::info!(
                count = messages.len(),
                recovered = recovered,
                evicted = evicted,
                "Message queue loaded"
            );
        }

        queue
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Subscribe to mutation notifications. The value is a change counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Append a record.
    ///
    /// Fails with `QueueFull` when the queue holds `max_queue_size` records and
    /// with `DuplicateMessage` when a pending record has identical text. If the
    /// snapshot cannot be written the append is rolled back.
    pub async fn enqueue(&self, message: QueuedMessage) -> Result<Uuid, QueueError> {
        let mut messages = self.messages.lock().await;

        if messages.len() >= self.config.max_queue_size {
            QueueMetrics::rejected("queue_full");
            return Err(QueueError::QueueFull {
                size: messages.len(),
                max: self.config.max_queue_size,
            });
        }

        if has_pending_text(&messages, message.text(), None) {
            QueueMetrics::rejected("duplicate");
            return Err(QueueError::DuplicateMessage);
        }

        let id = message.id;
        messages.push(message);

        if let Err(e) = save_json(self.store.as_ref(), QUEUE_KEY, &*messages).await {
            messages.pop();
            tracing::error!(message_id = %id, error = %e, "Failed to persist enqueue, rolled back");
            return Err(QueueError::Persistence(e));
        }

        QueueMetrics::enqueued();
        QueueMetrics::set_size(messages.len());
        tracing::debug!(message_id = %id, queue_size = messages.len(), "Message enqueued");

        self.notify();
        Ok(id)
    }

    /// Take the first ready record in insertion order and mark it `sending`.
    ///
    /// Records inside their backoff window or on hold are skipped.
    pub async fn dequeue(&self) -> Option<QueuedMessage> {
        let mut messages = self.messages.lock().await;
        let now = Utc::now();

        let record = messages.iter_mut().find(|m| m.is_ready_at(now))?;
        record.status = MessageStatus::Sending;
        record.last_attempt_at = Some(now);
        let dequeued = record.clone();

        tracing::debug!(
            message_id = %dequeued.id,
            retry_count = dequeued.retry_count,
            "Message dequeued for delivery"
        );

        self.persist_logged(&messages).await;
        self.notify();
        Some(dequeued)
    }

    /// Remove a delivered record. Returns `false` if it was no longer queued.
    pub async fn mark_as_sent(&self, id: Uuid) -> bool {
        let mut messages = self.messages.lock().await;
        let Some(index) = messages.iter().position(|m| m.id == id) else {
            tracing::debug!(message_id = %id, "Sent message no longer queued");
            return false;
        };

        messages.remove(index);
        QueueMetrics::set_size(messages.len());
        self.persist_logged(&messages).await;
        self.notify();
        true
    }

    /// Record a failed attempt.
    ///
    /// Only retryable failures consume budget. Retryable failures with budget left go back to `pending` with
    /// `next_retry_at = now + base * 2^(retry_count - 1)`; anything else becomes
    /// `failed`. Returns the updated record, or `None` if it was cancelled or
    /// superseded by an older pending record with the same text.
    pub async fn mark_as_failed(
        &self,
        id: Uuid,
        error: &str,
        retryable: bool,
    ) -> Option<QueuedMessage> {
        let mut messages = self.messages.lock().await;
        let record = messages.iter_mut().find(|m| m.id == id)?;

        let now = Utc::now();
        if retryable {
            record.retry_count += 1;
        }
        record.last_error = Some(error.to_string());
        record.last_attempt_at = Some(now);

        if retryable && record.retry_count < self.config.max_retries {
            let delay = self.config.backoff.delay_for(record.retry_count);
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            let next_retry_at = now + delay;
            record.status = MessageStatus::Pending;
            record.next_retry_at = Some(next_retry_at);

            tracing::info!(
                message_id = %id,
                retry_count = record.retry_count,
                next_retry_at = %next_retry_at,
                error = %error,
                "Delivery failed, scheduled retry"
            );
        } else {
            record.status = MessageStatus::Failed;
            record.next_retry_at = None;

            tracing::warn!(
                message_id = %id,
                retry_count = record.retry_count,
                retryable = retryable,
                error = %error,
                "Delivery failed permanently"
            );
        }

        drop_duplicate_pending(&mut messages);
        let updated = messages.iter().find(|m| m.id == id).cloned();
        QueueMetrics::set_size(messages.len());
        self.persist_logged(&messages).await;
        self.notify();
        updated
    }

    /// Park a record after a prevented conflict.
    ///
    /// The record returns to `pending` on hold without consuming retry budget
    /// and is not dequeued again until retried or cancelled.
    pub async fn hold(&self, id: Uuid, reason: &str) -> Option<QueuedMessage> {
        let mut messages = self.messages.lock().await;
        let record = messages.iter_mut().find(|m| m.id == id)?;

        record.status = MessageStatus::Pending;
        record.on_hold = true;
        record.next_retry_at = None;
        record.last_error = Some(reason.to_string());

        tracing::info!(message_id = %id, reason = %reason, "Message held for manual resolution");

        drop_duplicate_pending(&mut messages);
        let updated = messages.iter().find(|m| m.id == id).cloned();
        QueueMetrics::set_size(messages.len());
        self.persist_logged(&messages).await;
        self.notify();
        updated
    }

    /// Remove a record in any status, including one being sent.
    pub async fn cancel(&self, id: Uuid) -> Option<QueuedMessage> {
        let mut messages = self.messages.lock().await;
        let index = messages.iter().position(|m| m.id == id)?;
        let removed = messages.remove(index);

        tracing::info!(message_id = %id, status = removed.status.as_str(), "Message cancelled");

        QueueMetrics::set_size(messages.len());
        self.persist_logged(&messages).await;
        self.notify();
        Some(removed)
    }

    /// Return a failed or held record to circulation with a fresh budget.
    ///
    /// Fails with `DuplicateMessage` when another pending record already
    /// carries the same text.
    pub async fn retry(&self, id: Uuid) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().await;
        let index = messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(QueueError::NotFound(id))?;

        let record = &messages[index];
        let retriable = record.status == MessageStatus::Failed
            || (record.status == MessageStatus::Pending && record.on_hold);
        if !retriable {
            return Err(QueueError::InvalidState {
                id,
                status: record.status.as_str(),
            });
        }

        if has_pending_text(&messages, record.text(), Some(id)) {
            QueueMetrics::rejected("duplicate");
            return Err(QueueError::DuplicateMessage);
        }

        let record = &mut messages[index];
        record.status = MessageStatus::Pending;
        record.on_hold = false;
        record.retry_count = 0;
        record.last_error = None;
        record.next_retry_at = None;

        tracing::info!(message_id = %id, "Message reset for retry");

        self.persist_logged(&messages).await;
        self.notify();
        Ok(())
    }

    /// Remove every failed record. Returns how many were removed.
    pub async fn clear_failed(&self) -> usize {
        self.remove_where(|m| m.status == MessageStatus::Failed).await
    }

    /// Evict records older than `max_message_age` that are not being sent.
    pub async fn cleanup_stale(&self) -> usize {
        let now = Utc::now();
        let max_age = self.config.max_message_age;
        let removed = self
            .remove_where(|m| m.status != MessageStatus::Sending && m.is_stale_at(now, max_age))
            .await;

        if removed > 0 {
            QueueMetrics::evicted(removed);
            tracing::info!(removed = removed, "Evicted stale messages");
        }
        removed
    }

    /// Reset every `sending` record to `pending`. Returns how many were reset.
    ///
    /// A reset record whose text is already pending elsewhere collapses into
    /// the older of the two.
    pub async fn requeue_in_flight(&self) -> usize {
        let mut messages = self.messages.lock().await;
        let mut reset = 0;
        for record in messages.iter_mut().filter(|m| m.status == MessageStatus::Sending) {
            record.status = MessageStatus::Pending;
            reset += 1;
            tracing::info!(message_id = %record.id, "Reset in-flight message to pending");
        }

        if reset > 0 {
            drop_duplicate_pending(&mut messages);
            QueueMetrics::set_size(messages.len());
            self.persist_logged(&messages).await;
            self.notify();
        }
        reset
    }

    /// Remove everything.
    pub async fn clear(&self) -> usize {
        self.remove_where(|_| true).await
    }

    pub async fn get(&self, id: Uuid) -> Option<QueuedMessage> {
        self.messages.lock().await.iter().find(|m| m.id == id).cloned()
    }

    /// All records in insertion order.
    pub async fn all_messages(&self) -> Vec<QueuedMessage> {
        self.messages.lock().await.clone()
    }

    /// Pending records that are eligible now.
    pub async fn pending_messages(&self) -> Vec<QueuedMessage> {
        let now = Utc::now();
        self.filtered(|m| m.is_ready_at(now)).await
    }

    pub async fn failed_messages(&self) -> Vec<QueuedMessage> {
        self.filtered(|m| m.status == MessageStatus::Failed).await
    }

    /// Records parked after a prevented conflict.
    pub async fn held_messages(&self) -> Vec<QueuedMessage> {
        self.filtered(|m| m.status == MessageStatus::Pending && m.on_hold)
            .await
    }

    pub async fn count(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Pending records not on hold, including those waiting out a backoff.
    pub async fn pending_count(&self) -> usize {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.status == MessageStatus::Pending && !m.on_hold)
            .count()
    }

    pub async fn failed_count(&self) -> usize {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.status == MessageStatus::Failed)
            .count()
    }

    /// Whether any record is eligible now.
    pub async fn has_pending_messages(&self) -> bool {
        let now = Utc::now();
        self.messages.lock().await.iter().any(|m| m.is_ready_at(now))
    }

    pub async fn stats(&self) -> QueueStats {
        let messages = self.messages.lock().await;
        let now = Utc::now();
        let mut stats = QueueStats {
            total: messages.len(),
            max_queue_size: self.config.max_queue_size,
            ..QueueStats::default()
        };

        for m in messages.iter() {
            match m.status {
                MessageStatus::Pending if m.on_hold => stats.held += 1,
                MessageStatus::Pending => {
                    stats.pending += 1;
                    if m.is_ready_at(now) {
                        stats.ready += 1;
                    }
                }
                MessageStatus::Sending => stats.sending += 1,
                MessageStatus::Failed => stats.failed += 1,
            }
        }

        stats
    }

    async fn filtered<F>(&self, predicate: F) -> Vec<QueuedMessage>
    where
        F: Fn(&QueuedMessage) -> bool,
    {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    async fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QueuedMessage) -> bool,
    {
        let mut messages = self.messages.lock().await;
        let before = messages.len();
        messages.retain(|m| !predicate(m));
        let removed = before - messages.len();

        if removed > 0 {
            QueueMetrics::set_size(messages.len());
            self.persist_logged(&messages).await;
            self.notify();
        }
        removed
    }

    async fn persist_logged(&self, messages: &[QueuedMessage]) {
        if let Err(e) = save_json(self.store.as_ref(), QUEUE_KEY, messages).await {
            tracing::warn!(
                error = %e,
                backend = self.store.backend_name(),
                "Failed to persist queue snapshot"
            );
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// Whether a pending record other than `except` has exactly `text`.
fn has_pending_text(messages: &[QueuedMessage], text: &str, except: Option<Uuid>) -> bool {
    messages.iter().any(|m| {
        m.status == MessageStatus::Pending && Some(m.id) != except && m.text() == text
    })
}

/// Keep only the oldest pending record for each text. Returns how many were dropped.
fn drop_duplicate_pending(messages: &mut Vec<QueuedMessage>) -> usize {
    let mut seen = HashSet::new();
    let before = messages.len();
    messages.retain(|m| {
        if m.status != MessageStatus::Pending || seen.insert(m.text().to_string()) {
            return true;
        }
        tracing::info!(message_id = %m.id, "Dropped pending message duplicating an older one");
        false
    });
    before - messages.len()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::board::BoardMessage;
    use crate::delivery::BackoffPolicy;
    use crate::storage::{MemoryStateStore, StorageError};

    fn record(text: &str) -> QueuedMessage {
        QueuedMessage::new(BoardMessage::new(text).unwrap())
    }

    fn config() -> QueueConfig {
        QueueConfig {
            max_queue_size: 3,
            ..QueueConfig::default()
        }
    }

    async fn queue_with(config: QueueConfig) -> (PersistentQueue, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let queue = PersistentQueue::load(store.clone(), config).await;
        (queue, store)
    }

    #[tokio::test]
    async fn test_enqueue_respects_max_size() {
        let (queue, _) = queue_with(config()).await;
        for text in ["ONE", "TWO", "THREE"] {
            queue.enqueue(record(text)).await.unwrap();
        }

        let result = queue.enqueue(record("FOUR")).await;
        assert!(matches!(result, Err(QueueError::QueueFull { size: 3, max: 3 })));
        assert_eq!(queue.count().await, 3);
    }

    #[tokio::test]
    async fn test_count_never_exceeds_max_across_operations() {
        let (queue, _) = queue_with(config()).await;
        for i in 0..10 {
            let _ = queue.enqueue(record(&format!("MSG {}", i))).await;
            assert!(queue.count().await <= 3);
            if i % 3 == 0 {
                if let Some(m) = queue.dequeue().await {
                    queue.mark_as_failed(m.id, "boom", true).await;
                }
            }
            if i % 4 == 0 {
                if let Some(m) = queue.dequeue().await {
                    queue.mark_as_sent(m.id).await;
                }
            }
            assert!(queue.count().await <= 3);
        }
    }

    #[tokio::test]
    async fn test_duplicate_pending_text_rejected() {
        let (queue, _) = queue_with(config()).await;
        queue.enqueue(record("HELLO")).await.unwrap();

        let result = queue.enqueue(record("HELLO")).await;
        assert!(matches!(result, Err(QueueError::DuplicateMessage)));
        assert_eq!(queue.count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_allowed_once_original_is_sending() {
        let (queue, _) = queue_with(config()).await;
        queue.enqueue(record("HELLO")).await.unwrap();
        queue.dequeue().await.unwrap();

        assert!(queue.enqueue(record("HELLO")).await.is_ok());
    }

    async fn pending_with_text(queue: &PersistentQueue, text: &str) -> usize {
        queue
            .all_messages()
            .await
            .iter()
            .filter(|m| m.status == MessageStatus::Pending && m.text() == text)
            .count()
    }

    #[tokio::test]
    async fn test_retry_rejected_while_same_text_pending() {
        let (queue, _) = queue_with(config()).await;
        let first = queue.enqueue(record("HELLO")).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.mark_as_failed(first, "unauthorized", false).await.unwrap();
        queue.enqueue(record("HELLO")).await.unwrap();

        let result = queue.retry(first).await;
        assert!(matches!(result, Err(QueueError::DuplicateMessage)));
        assert_eq!(queue.get(first).await.unwrap().status, MessageStatus::Failed);
        assert_eq!(pending_with_text(&queue, "HELLO").await, 1);
    }

    #[tokio::test]
    async fn test_reload_collapses_duplicate_pending_text() {
        let store = Arc::new(MemoryStateStore::new());
        let (first, second) = {
            let queue = PersistentQueue::load(store.clone(), config()).await;
            let first = queue.enqueue(record("HELLO")).await.unwrap();
            queue.dequeue().await.unwrap();
            let second = queue.enqueue(record("HELLO")).await.unwrap();
            (first, second)
        };

        let reloaded = PersistentQueue::load(store, config()).await;
        assert_eq!(pending_with_text(&reloaded, "HELLO").await, 1);
        assert!(reloaded.get(first).await.is_some());
        assert!(reloaded.get(second).await.is_none());
        assert_eq!(reloaded.count().await, 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_collapses_into_older_pending_copy() {
        let config = QueueConfig {
            backoff: BackoffPolicy::with_base_delay(Duration::ZERO),
            ..config()
        };
        let (queue, _) = queue_with(config).await;
        let first = queue.enqueue(record("HELLO")).await.unwrap();
        queue.dequeue().await.unwrap();
        let second = queue.enqueue(record("HELLO")).await.unwrap();

        let updated = queue.mark_as_failed(first, "server error", true).await.unwrap();
        assert_eq!(updated.status, MessageStatus::Pending);
        assert_eq!(pending_with_text(&queue, "HELLO").await, 1);
        assert!(queue.get(second).await.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_marks_sending_in_insertion_order() {
        let (queue, _) = queue_with(config()).await;
        let first = queue.enqueue(record("FIRST")).await.unwrap();
        queue.enqueue(record("SECOND")).await.unwrap();

        let dequeued = queue.dequeue().await.unwrap();
        assert_eq!(dequeued.id, first);
        assert_eq!(dequeued.status, MessageStatus::Sending);
        assert!(dequeued.last_attempt_at.is_some());

        let stored = queue.get(first).await.unwrap();
        assert_eq!(stored.status, MessageStatus::Sending);
    }

    #[tokio::test]
    async fn test_dequeue_skips_records_in_backoff() {
        let (queue, _) = queue_with(config()).await;
        let first = queue.enqueue(record("FIRST")).await.unwrap();
        let second = queue.enqueue(record("SECOND")).await.unwrap();

        let m = queue.dequeue().await.unwrap();
        assert_eq!(m.id, first);
        queue.mark_as_failed(first, "server error", true).await.unwrap();

        let next = queue.dequeue().await.unwrap();
        assert_eq!(next.id, second);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn test_backoff_schedule() {
        let config = QueueConfig {
            max_retries: 4,
            ..config()
        };
        let (queue, _) = queue_with(config).await;
        let id = queue.enqueue(record("RETRY ME")).await.unwrap();

        for expected in [2i64, 4, 8] {
            queue.dequeue().await.unwrap();
            let updated = queue.mark_as_failed(id, "timeout", true).await.unwrap();
            assert_eq!(updated.status, MessageStatus::Pending);

            let delay = updated.next_retry_at.unwrap() - updated.last_attempt_at.unwrap();
            assert_eq!(delay.num_seconds(), expected);

            queue.messages.lock().await[0].next_retry_at = None;
        }
    }

    #[tokio::test]
    async fn test_failed_after_max_retries() {
        let config = QueueConfig {
            backoff: BackoffPolicy::with_base_delay(Duration::ZERO),
            ..config()
        };
        let (queue, _) = queue_with(config).await;
        let id = queue.enqueue(record("FLAKY")).await.unwrap();

        for attempt in 1..=3 {
            let m = queue.dequeue().await.unwrap();
            let updated = queue.mark_as_failed(m.id, "server error", true).await.unwrap();
            assert_eq!(updated.retry_count, attempt);
        }

        let record = queue.get(id).await.unwrap();
        assert_eq!(record.status, MessageStatus::Failed);
        assert!(queue.dequeue().await.is_none());
        assert!(!queue.has_pending_messages().await);
        assert_eq!(queue.failed_messages().await.len(), 1);

        queue.retry(id).await.unwrap();
        let record = queue.get(id).await.unwrap();
        assert_eq!(record.status, MessageStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.last_error.is_none());
        assert!(queue.has_pending_messages().await);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_straight_to_failed() {
        let (queue, _) = queue_with(config()).await;
        let id = queue.enqueue(record("BAD")).await.unwrap();
        queue.dequeue().await.unwrap();

        let updated = queue.mark_as_failed(id, "unauthorized", false).await.unwrap();
        assert_eq!(updated.status, MessageStatus::Failed);
        assert_eq!(updated.retry_count, 0);
        assert_eq!(updated.last_error.as_deref(), Some("unauthorized"));
    }

    #[tokio::test]
    async fn test_completion_after_cancel_is_noop() {
        let (queue, _) = queue_with(config()).await;
        let id = queue.enqueue(record("GONE")).await.unwrap();
        queue.dequeue().await.unwrap();

        let cancelled = queue.cancel(id).await.unwrap();
        assert_eq!(cancelled.status, MessageStatus::Sending);

        assert!(!queue.mark_as_sent(id).await);
        assert!(queue.mark_as_failed(id, "late", true).await.is_none());
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn test_hold_keeps_budget_and_blocks_dequeue() {
        let (queue, _) = queue_with(config()).await;
        let id = queue.enqueue(record("HOLD")).await.unwrap();
        queue.dequeue().await.unwrap();

        let held = queue.hold(id, "conflict detected").await.unwrap();
        assert_eq!(held.status, MessageStatus::Pending);
        assert_eq!(held.retry_count, 0);
        assert!(held.on_hold);
        assert!(queue.dequeue().await.is_none());
        assert_eq!(queue.held_messages().await.len(), 1);

        queue.retry(id).await.unwrap();
        assert!(queue.dequeue().await.is_some());
    }

    #[tokio::test]
    async fn test_retry_rejects_active_records() {
        let (queue, _) = queue_with(config()).await;
        let id = queue.enqueue(record("ACTIVE")).await.unwrap();
        assert!(matches!(
            queue.retry(id).await,
            Err(QueueError::InvalidState { status: "pending", .. })
        ));
        assert!(matches!(
            queue.retry(Uuid::new_v4()).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_failed() {
        let (queue, _) = queue_with(config()).await;
        let a = queue.enqueue(record("A")).await.unwrap();
        queue.enqueue(record("B")).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.mark_as_failed(a, "bad", false).await;

        assert_eq!(queue.clear_failed().await, 1);
        assert_eq!(queue.count().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_stale_spares_sending() {
        let config = QueueConfig {
            max_message_age: Duration::from_secs(60),
            ..config()
        };
        let (queue, _) = queue_with(config).await;

        let mut old = record("OLD");
        old.enqueued_at = Utc::now() - chrono::Duration::seconds(120);
        let mut old_sending = record("OLD SENDING");
        old_sending.enqueued_at = Utc::now() - chrono::Duration::seconds(120);
        queue.enqueue(old_sending.clone()).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.enqueue(old).await.unwrap();
        queue.enqueue(record("FRESH")).await.unwrap();

        assert_eq!(queue.cleanup_stale().await, 1);
        assert!(queue.get(old_sending.id).await.is_some());
        assert_eq!(queue.count().await, 2);
    }

    #[tokio::test]
    async fn test_reload_resets_sending_to_pending() {
        let store = Arc::new(MemoryStateStore::new());
        let id = {
            let queue = PersistentQueue::load(store.clone(), config()).await;
            let id = queue.enqueue(record("CRASH")).await.unwrap();
            queue.dequeue().await.unwrap();
            id
        };

        let reloaded = PersistentQueue::load(store, config()).await;
        let record = reloaded.get(id).await.unwrap();
        assert_eq!(record.status, MessageStatus::Pending);
        assert!(reloaded.has_pending_messages().await);
    }

    #[tokio::test]
    async fn test_every_mutation_persists_snapshot() {
        let (queue, store) = queue_with(config()).await;
        let id = queue.enqueue(record("SNAP")).await.unwrap();

        let stored: Vec<QueuedMessage> = load_json(store.as_ref(), QUEUE_KEY).await.unwrap().unwrap();
        assert_eq!(stored.len(), 1);

        queue.dequeue().await.unwrap();
        let stored: Vec<QueuedMessage> = load_json(store.as_ref(), QUEUE_KEY).await.unwrap().unwrap();
        assert_eq!(stored[0].status, MessageStatus::Sending);

        queue.mark_as_sent(id).await;
        let stored: Vec<QueuedMessage> = load_json(store.as_ref(), QUEUE_KEY).await.unwrap().unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_sees_mutations() {
        let (queue, _) = queue_with(config()).await;
        let mut rx = queue.subscribe();
        queue.enqueue(record("NOTIFY")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        queue.clear().await;
        assert!(rx.has_changed().unwrap());
    }

    struct FailingStore;

    #[async_trait]
    impl StateStore for FailingStore {
        async fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        async fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_enqueue_rolls_back_on_persist_failure() {
        let queue = PersistentQueue::load(Arc::new(FailingStore), config()).await;
        let result = queue.enqueue(record("LOST")).await;
        assert!(matches!(result, Err(QueueError::Persistence(_))));
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let config = QueueConfig {
            max_queue_size: 10,
            ..QueueConfig::default()
        };
        let (queue, _) = queue_with(config).await;
        let a = queue.enqueue(record("A")).await.unwrap();
        let b = queue.enqueue(record("B")).await.unwrap();
        queue.enqueue(record("C")).await.unwrap();
        queue.enqueue(record("D")).await.unwrap();

        queue.dequeue().await;
        queue.mark_as_failed(a, "bad", false).await;
        queue.dequeue().await;
        queue.hold(b, "conflict").await;
        queue.dequeue().await;

        let stats = queue.stats().await;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.held, 1);
        assert_eq!(stats.sending, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.max_queue_size, 10);
    }
}
