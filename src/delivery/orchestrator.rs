//! Single-flight delivery loop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use super::conflict::{ConflictCheck, ConflictDetector};
use super::events::DeliveryObserver;
use super::{DeliveryConfiguration, DeliveryError, QueueState};
use crate::board::{BoardMessage, BoardSnapshot, HistoryEntry, HistoryStatus};
use crate::client::{ApiError, BoardApi};
use crate::credentials::CredentialProvider;
use crate::digest::BurstDigestService;
use crate::metrics::DeliveryMetrics;
use crate::network::NetworkMonitor;
use crate::queue::{MessagePriority, MessageStatus, PersistentQueue, QueuedMessage};
use crate::storage::ContentCache;

/// Cooperative time budget for a processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(tokio::time::Instant);

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self(tokio::time::Instant::now() + budget)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(tokio::time::Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Summary of one processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub delivered: usize,
    pub failed: usize,
    pub conflicts: usize,
    /// Pending records left when the run ended
    pub remaining: usize,
    /// `false` when the deadline stopped the run early
    pub completed: bool,
}

/// Releases the single-flight guard and wakes waiters.
pub(super) struct DeliveringGuard<'a> {
    orchestrator: &'a DeliveryOrchestrator,
}

impl Drop for DeliveringGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.is_delivering.store(false, Ordering::SeqCst);
        self.orchestrator.loop_finished.notify_waiters();
    }
}

/// Drives queued messages to the board.
///
/// At most one processing loop runs per orchestrator. Triggers that arrive
/// while a loop is running are coalesced into it: the loop keeps going while
/// ready messages remain.
pub struct DeliveryOrchestrator {
    config: DeliveryConfiguration,
    queue: Arc<PersistentQueue>,
    api: Arc<dyn BoardApi>,
    credentials: Arc<dyn CredentialProvider>,
    cache: Arc<dyn ContentCache>,
    network: Arc<dyn NetworkMonitor>,
    detector: ConflictDetector,
    digest: BurstDigestService,
    observers: Vec<Arc<dyn DeliveryObserver>>,
    is_delivering: AtomicBool,
    loop_finished: Notify,
    state: watch::Sender<QueueState>,
}

impl DeliveryOrchestrator {
    pub fn new(
        config: DeliveryConfiguration,
        queue: Arc<PersistentQueue>,
        api: Arc<dyn BoardApi>,
        credentials: Arc<dyn CredentialProvider>,
        cache: Arc<dyn ContentCache>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Self {
        let (state, _rx) = watch::channel(QueueState::Idle);
        Self {
            detector: ConflictDetector::new(cache.clone()),
            digest: BurstDigestService::default(),
            config,
            queue,
            api,
            credentials,
            cache,
            network,
            observers: Vec::new(),
            is_delivering: AtomicBool::new(false),
            loop_finished: Notify::new(),
            state,
        }
    }

    /// Register an observer. Observers are fixed once the orchestrator is shared.
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_digest_service(mut self, digest: BurstDigestService) -> Self {
        self.digest = digest;
        self
    }

    pub fn config(&self) -> &DeliveryConfiguration {
        &self.config
    }

    pub fn queue(&self) -> &Arc<PersistentQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<dyn ContentCache> {
        &self.cache
    }

    pub fn network(&self) -> &Arc<dyn NetworkMonitor> {
        &self.network
    }

    pub fn is_delivering(&self) -> bool {
        self.is_delivering.load(Ordering::SeqCst)
    }

    /// Current aggregate state.
    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    /// Validate, enqueue, and trigger delivery. Returns the queued id.
    pub async fn send_message(self: &Arc<Self>, text: &str) -> Result<Uuid, DeliveryError> {
        self.send_message_with_priority(text, MessagePriority::Normal)
            .await
    }

    pub async fn send_message_with_priority(
        self: &Arc<Self>,
        text: &str,
        priority: MessagePriority,
    ) -> Result<Uuid, DeliveryError> {
        let message = BoardMessage::new(text)?;
        self.submit(QueuedMessage::new(message).with_priority(priority))
            .await
    }

    /// Enqueue a prepared record and trigger delivery.
    pub async fn submit(self: &Arc<Self>, record: QueuedMessage) -> Result<Uuid, DeliveryError> {
        let id = self.queue.enqueue(record).await?;

        tracing::info!(
            message_id = %id,
            strategy = %self.config.strategy,
            "Message queued for delivery"
        );

        self.refresh_state().await;
        self.trigger();
        Ok(id)
    }

    /// Remove a message, even one in flight. The in-flight call is not aborted.
    pub async fn cancel_message(&self, id: Uuid) -> Result<(), DeliveryError> {
        self.queue.cancel(id).await.ok_or(DeliveryError::NotFound)?;
        self.notify(|o| o.did_cancel(id));
        self.refresh_state().await;
        Ok(())
    }

    /// Return a failed or held message to circulation.
    pub async fn retry_message(self: &Arc<Self>, id: Uuid) -> Result<(), DeliveryError> {
        self.queue.retry(id).await?;
        self.refresh_state().await;
        self.trigger();
        Ok(())
    }

    /// Drop every failed message. Returns how many were removed.
    pub async fn clear_failed_messages(&self) -> usize {
        let removed = self.queue.clear_failed().await;
        self.refresh_state().await;
        removed
    }

    /// Evict stale messages and re-derive state.
    pub async fn cleanup_stale(&self) -> usize {
        let removed = self.queue.cleanup_stale().await;
        if removed > 0 {
            self.refresh_state().await;
        }
        removed
    }

    /// Re-evaluate the queue. Starts a loop in the background unless one is running.
    pub fn trigger(self: &Arc<Self>) {
        if self.is_delivering() {
            tracing::trace!("Delivery loop already running, trigger coalesced");
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            // A message enqueued just as the loop released the guard would
            // otherwise wait for the next timer tick.
            while this.process_pending(None).await.is_some() {
                if !this.network.is_connected() || !this.queue.has_pending_messages().await {
                    break;
                }
            }
        });
    }

    /// Run the loop inline until the queue has nothing ready or `deadline` passes.
    ///
    /// Returns `None` when another loop already holds the guard.
    pub async fn process_pending(&self, deadline: Option<Deadline>) -> Option<ProcessOutcome> {
        let guard = self.try_begin_delivery()?;
        let outcome = self.run_loop(deadline).await;
        drop(guard);

        self.refresh_state().await;
        Some(outcome)
    }

    /// Wait until no loop holds the guard.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.loop_finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_delivering() {
                return;
            }
            notified.await;
        }
    }

    pub(super) fn try_begin_delivery(&self) -> Option<DeliveringGuard<'_>> {
        self.is_delivering
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DeliveringGuard { orchestrator: self })
    }

    pub(super) async fn run_loop(&self, deadline: Option<Deadline>) -> ProcessOutcome {
        let mut outcome = ProcessOutcome {
            completed: true,
            ..ProcessOutcome::default()
        };

        loop {
            if deadline.is_some_and(|d| d.is_expired()) {
                outcome.completed = false;
                break;
            }

            if !self.network.is_connected() {
                tracing::debug!("No network connectivity, delivery paused");
                self.set_state(QueueState::WaitingForNetwork);
                break;
            }

            let Some(queued) = self.queue.dequeue().await else {
                break;
            };

            self.set_state(QueueState::Delivering);
            self.notify(|o| o.will_send(&queued));

            let started = Instant::now();
            match self.deliver_message(&queued).await {
                Ok(()) => {
                    if self.complete_success(&queued, started).await {
                        outcome.delivered += 1;
                    }
                }
                Err(DeliveryError::ConflictDetected) => {
                    if self.complete_conflict(&queued).await {
                        outcome.conflicts += 1;
                    }
                }
                Err(error) => {
                    if self.complete_failure(&queued, error).await {
                        outcome.failed += 1;
                    }
                }
            }

            if !self.queue.has_pending_messages().await {
                break;
            }

            let pacing = self.config.pacing_delay;
            if let Some(deadline) = deadline {
                if deadline.remaining() <= pacing {
                    outcome.completed = false;
                    break;
                }
            }
            tokio::time::sleep(pacing).await;
        }

        outcome.remaining = self.queue.pending_count().await;

        tracing::debug!(
            delivered = outcome.delivered,
            failed = outcome.failed,
            conflicts = outcome.conflicts,
            remaining = outcome.remaining,
            completed = outcome.completed,
            "Delivery loop finished"
        );

        outcome
    }

    /// Attempt one delivery according to the strategy. Does not touch the queue.
    ///
    /// On success the board is re-read and the cache refreshed; that re-read is
    /// best-effort and never turns a delivered message into a failure.
    pub async fn deliver_message(&self, queued: &QueuedMessage) -> Result<(), DeliveryError> {
        let credentials = self.credentials.retrieve().await?;
        let strategy = self.config.strategy;

        if strategy.should_check_conflicts() {
            let current = self.call(self.api.current_board(&credentials)).await?;

            if let ConflictCheck::Conflict { .. } = self.detector.check(&current).await {
                DeliveryMetrics::conflict();
                self.notify(|o| o.did_detect_conflict(queued, &current));

                if strategy.should_prevent_conflicts() {
                    tracing::warn!(
                        message_id = %queued.id,
                        strategy = %strategy,
                        "Conflict detected, delivery prevented"
                    );
                    return Err(DeliveryError::ConflictDetected);
                }

                tracing::info!(
                    message_id = %queued.id,
                    strategy = %strategy,
                    "Conflict detected, overwriting (last write wins)"
                );
            }
        }

        self.call(self.api.post_message(&credentials, queued.text()))
            .await?;

        match self.call(self.api.current_board(&credentials)).await {
            Ok(snapshot) => self.sync_content(&snapshot).await,
            Err(e) => {
                tracing::warn!(
                    message_id = %queued.id,
                    error = %e,
                    "Posted message but failed to refresh board content"
                );
            }
        }

        Ok(())
    }

    /// If recent history is a burst, enqueue a digest of it.
    pub async fn send_digest_if_burst(self: &Arc<Self>) -> Result<Option<Uuid>, DeliveryError> {
        let history = match self.cache.history().await {
            Ok(history) => history
                .into_iter()
                .filter(|entry| entry.status == HistoryStatus::Sent)
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read history for digest");
                return Ok(None);
            }
        };

        let (should_digest, recent) = self.digest.analyze_history(&history);
        if !should_digest || recent.len() < self.digest.config().min_messages_for_digest {
            return Ok(None);
        }

        let Some(digest) = self.digest.create_digest(&recent) else {
            return Ok(None);
        };

        tracing::info!(messages = recent.len(), "Burst detected, sending digest");
        let record = QueuedMessage::new(digest).with_metadata("kind", "digest");
        self.submit(record).await.map(Some)
    }

    async fn call<T, F>(&self, request: F) -> Result<T, DeliveryError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result.map_err(DeliveryError::from),
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    async fn sync_content(&self, snapshot: &BoardSnapshot) {
        if let Err(e) = self.cache.save_board(snapshot).await {
            tracing::warn!(error = %e, "Failed to cache board content");
        }
        if let Err(e) = self.cache.save_last_sync_time(Utc::now()).await {
            tracing::warn!(error = %e, "Failed to record last sync time");
        }
        self.notify(|o| o.content_changed(snapshot));
    }

    async fn complete_success(&self, queued: &QueuedMessage, started: Instant) -> bool {
        if !self.queue.mark_as_sent(queued.id).await {
            tracing::debug!(message_id = %queued.id, "Delivered message was cancelled mid-flight");
            return false;
        }

        let entry = HistoryEntry {
            id: queued.id,
            text: queued.text().to_string(),
            status: HistoryStatus::Sent,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.cache.add_to_history(entry).await {
            tracing::warn!(message_id = %queued.id, error = %e, "Failed to record history");
        }

        DeliveryMetrics::delivered(started.elapsed().as_secs_f64());
        tracing::info!(
            message_id = %queued.id,
            retry_count = queued.retry_count,
            "Message delivered"
        );

        self.notify(|o| o.did_send(queued));
        true
    }

    async fn complete_conflict(&self, queued: &QueuedMessage) -> bool {
        let reason = DeliveryError::ConflictDetected.to_string();
        let Some(held) = self.queue.hold(queued.id, &reason).await else {
            return false;
        };

        self.notify(|o| o.did_fail(&held, &DeliveryError::ConflictDetected));
        true
    }

    async fn complete_failure(&self, queued: &QueuedMessage, error: DeliveryError) -> bool {
        let retryable = error.is_retryable();
        let Some(updated) = self
            .queue
            .mark_as_failed(queued.id, &error.to_string(), retryable)
            .await
        else {
            tracing::debug!(message_id = %queued.id, "Failed message was cancelled mid-flight");
            return false;
        };

        DeliveryMetrics::failed(error.kind(), retryable);

        if updated.status == MessageStatus::Failed {
            let entry = HistoryEntry {
                id: updated.id,
                text: updated.text().to_string(),
                status: HistoryStatus::Failed,
                timestamp: Utc::now(),
            };
            if let Err(e) = self.cache.add_to_history(entry).await {
                tracing::warn!(message_id = %updated.id, error = %e, "Failed to record history");
            }
        }

        self.notify(|o| o.did_fail(&updated, &error));
        true
    }

    /// Re-derive the aggregate state from the queue and connectivity.
    pub async fn refresh_state(&self) -> QueueState {
        let stats = self.queue.stats().await;
        let state = QueueState::derive(&stats, self.network.is_connected(), self.is_delivering());
        self.set_state(state);
        state
    }

    fn set_state(&self, state: QueueState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            DeliveryMetrics::set_state(state);
            tracing::debug!(state = state.as_str(), "Queue state changed");
            self.notify(|o| o.state_changed(state));
        }
    }

    fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn DeliveryObserver),
    {
        for observer in &self.observers {
            f(observer.as_ref());
        }
    }
}
