use std::sync::Arc;

use tokio::sync::broadcast;

use crate::delivery::DeliveryOrchestrator;

/// Long-running producer of delivery triggers.
///
/// Re-evaluates the queue on the poll timer and whenever connectivity comes
/// back, and sweeps stale records on the cleanup timer.
pub struct DeliveryScheduler {
    orchestrator: Arc<DeliveryOrchestrator>,
    shutdown: broadcast::Receiver<()>,
}

impl DeliveryScheduler {
    pub fn new(orchestrator: Arc<DeliveryOrchestrator>, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            orchestrator,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        let config = self.orchestrator.config().clone();

        let mut poll_timer = tokio::time::interval(config.poll_interval);
        let mut cleanup_timer = tokio::time::interval(config.cleanup_interval);

        // Skip immediate first tick
        poll_timer.tick().await;
        cleanup_timer.tick().await;

        let mut connectivity = self.orchestrator.network().subscribe();
        let mut was_connected = *connectivity.borrow_and_update();
        let mut watching_network = true;

        tracing::info!(
            poll_interval_secs = config.poll_interval.as_secs(),
            cleanup_interval_secs = config.cleanup_interval.as_secs(),
            connected = was_connected,
            "Delivery scheduler started"
        );

        // Records restored from storage may already be due
        self.orchestrator.trigger();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Delivery scheduler received shutdown signal");
                    break;
                }
                _ = poll_timer.tick() => {
                    self.orchestrator.trigger();
                }
                _ = cleanup_timer.tick() => {
                    let removed = self.orchestrator.cleanup_stale().await;
                    if removed > 0 {
                        tracing::info!(removed = removed, "Stale messages evicted");
                    }
                }
                changed = connectivity.changed(), if watching_network => {
                    if changed.is_err() {
                        tracing::warn!("Network monitor closed, relying on poll timer");
                        watching_network = false;
                        continue;
                    }

                    let connected = *connectivity.borrow_and_update();
                    if connected && !was_connected {
                        tracing::info!("Connectivity restored, resuming delivery");
                        self.orchestrator.trigger();
                    } else if !connected {
                        self.orchestrator.refresh_state().await;
                    }
                    was_connected = connected;
                }
            }
        }

        tracing::info!("Delivery scheduler stopped");
    }
}
