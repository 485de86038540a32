//! Bounded-time processing for an external background scheduler.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use super::orchestrator::{Deadline, DeliveringGuard, DeliveryOrchestrator, ProcessOutcome};
use crate::metrics::BackgroundMetrics;

/// Background window settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundConfig {
    /// Execution window granted by the host
    pub budget: Duration,
    /// Headroom kept between the cooperative deadline and the hard cutoff
    pub safety_margin: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(25),
            safety_margin: Duration::from_secs(2),
        }
    }
}

/// Result reported back to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackgroundRunResult {
    /// The run finished all ready work within the window
    pub success: bool,
    /// The hard cutoff interrupted the run
    pub timed_out: bool,
    pub delivered: usize,
    pub failed: usize,
    pub remaining: usize,
}

/// Runs the delivery loop inside a fixed execution window.
///
/// The loop gets a cooperative deadline of `budget - safety_margin` and is
/// raced against a hard timer of `budget`. When the timer wins the loop is
/// dropped and any record it left in `sending` is returned to `pending`, so
/// the queue is consistent whatever the host does next. The delivery guard
/// outlives the dropped loop until that reset is done.
pub struct BackgroundProcessor {
    orchestrator: Arc<DeliveryOrchestrator>,
    config: BackgroundConfig,
}

impl BackgroundProcessor {
    pub fn new(orchestrator: Arc<DeliveryOrchestrator>, config: BackgroundConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    /// Process pending messages within the configured budget.
    pub async fn process_pending_now(&self) -> BackgroundRunResult {
        self.process_pending_within(self.config.budget).await
    }

    /// Process pending messages within `budget`.
    pub async fn process_pending_within(&self, budget: Duration) -> BackgroundRunResult {
        let orchestrator = &self.orchestrator;
        let soft_deadline = Deadline::after(budget.saturating_sub(self.config.safety_margin));
        let held: Mutex<Option<DeliveringGuard<'_>>> = Mutex::new(None);

        tracing::info!(budget_ms = budget.as_millis() as u64, "Background processing started");

        let work = async {
            loop {
                if let Some(guard) = orchestrator.try_begin_delivery() {
                    *lock(&held) = Some(guard);
                    let outcome = orchestrator.run_loop(Some(soft_deadline)).await;
                    lock(&held).take();
                    return outcome;
                }

                tracing::debug!("Waiting for foreground delivery loop to finish");
                orchestrator.wait_until_idle().await;

                if soft_deadline.is_expired() {
                    return ProcessOutcome::default();
                }
            }
        };

        let result = tokio::select! {
            outcome = work => BackgroundRunResult {
                success: outcome.completed,
                timed_out: false,
                delivered: outcome.delivered,
                failed: outcome.failed,
                remaining: outcome.remaining,
            },
            _ = tokio::time::sleep(budget) => {
                let guard = lock(&held).take();
                if guard.is_some() {
                    let reset = orchestrator.queue().requeue_in_flight().await;
                    tracing::warn!(reset = reset, "Background window expired mid-delivery");
                } else {
                    tracing::warn!("Background window expired waiting for foreground delivery");
                }
                drop(guard);

                BackgroundRunResult {
                    success: false,
                    timed_out: true,
                    remaining: orchestrator.queue().pending_count().await,
                    ..BackgroundRunResult::default()
                }
            }
        };

        orchestrator.refresh_state().await;

        BackgroundMetrics::run(if result.timed_out {
            "timed_out"
        } else if result.success {
            "completed"
        } else {
            "partial"
        });

        tracing::info!(
            success = result.success,
            timed_out = result.timed_out,
            delivered = result.delivered,
            failed = result.failed,
            remaining = result.remaining,
            "Background processing finished"
        );

        result
    }
}

fn lock<T>(slot: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
