use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::network::WatchNetworkMonitor;

/// Periodic TCP reachability check against the board API host.
pub struct ConnectivityProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
    monitor: Arc<WatchNetworkMonitor>,
    shutdown: broadcast::Receiver<()>,
}

impl ConnectivityProbe {
    pub fn new(
        host: &str,
        port: u16,
        interval: Duration,
        timeout: Duration,
        monitor: Arc<WatchNetworkMonitor>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            target: format!("{}:{}", host, port),
            interval,
            timeout,
            monitor,
            shutdown,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// One connection attempt; `false` on refusal, resolution failure or timeout.
    pub async fn check(&self) -> bool {
        match timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(address = %self.target, error = %e, "Connectivity probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(
                    address = %self.target,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Connectivity probe timed out"
                );
                false
            }
        }
    }

    /// Probe immediately, then on every interval until shutdown.
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);

        tracing::info!(
            address = %self.target,
            interval_secs = self.interval.as_secs(),
            "Connectivity probe started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Connectivity probe received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    let connected = self.check().await;
                    self.monitor.set_connected(connected);
                }
            }
        }

        tracing::info!("Connectivity probe stopped");
    }
}
