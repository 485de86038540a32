//! Graceful shutdown handling for the courier.
//!
//! The sequence:
//! 1. Signals background tasks (scheduler, probe) to stop
//! 2. Waits, bounded, for an in-flight delivery to finish
//! 3. Returns any record still marked `sending` to `pending` and persists the queue

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::delivery::DeliveryOrchestrator;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for an in-flight delivery to complete (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Handles graceful shutdown of the courier
pub struct GracefulShutdown {
    orchestrator: Arc<DeliveryOrchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(orchestrator: Arc<DeliveryOrchestrator>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(orchestrator, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        orchestrator: Arc<DeliveryOrchestrator>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            orchestrator,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(name = "graceful_shutdown", skip(self))]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping tasks");
        result.tasks_signalled = self.shutdown_tx.send(()).unwrap_or(0);

        tracing::info!("Phase 2: Waiting for in-flight delivery");
        result.drained = self.drain().await;

        tracing::info!("Phase 3: Persisting queue");
        let queue = self.orchestrator.queue();
        result.requeued = queue.requeue_in_flight().await;
        result.pending = queue.pending_count().await;

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            tasks_signalled = result.tasks_signalled,
            drained = result.drained,
            requeued = result.requeued,
            pending = result.pending,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    async fn drain(&self) -> bool {
        if !self.orchestrator.is_delivering() {
            return true;
        }

        match timeout(self.config.drain_timeout, self.orchestrator.wait_until_idle()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.drain_timeout.as_millis() as u64,
                    "Delivery still in flight at shutdown"
                );
                false
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    /// Receivers that got the stop signal
    pub tasks_signalled: usize,
    /// Whether the delivery loop went idle before the timeout
    pub drained: bool,
    /// Records reset from `sending` to `pending`
    pub requeued: usize,
    /// Records left for the next start
    pub pending: usize,
    pub duration: Duration,
}
