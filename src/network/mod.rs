//! Network reachability as seen by the delivery loop.
//!
//! The monitor only reports a boolean and publishes changes. Detecting
//! reachability is left to producers such as
//! [`ConnectivityProbe`](crate::tasks::ConnectivityProbe).

use tokio::sync::watch;

/// Current connectivity and a feed of changes.
pub trait NetworkMonitor: Send + Sync {
    /// Whether the board API is believed reachable.
    fn is_connected(&self) -> bool;

    /// Subscribe to connectivity changes.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Monitor backed by a watch channel that producers update.
pub struct WatchNetworkMonitor {
    tx: watch::Sender<bool>,
}

impl WatchNetworkMonitor {
    pub fn new(initially_connected: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_connected);
        Self { tx }
    }

    /// Publish the latest connectivity. Subscribers are woken only on change.
    pub fn set_connected(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });

        if changed {
            tracing::info!(connected = connected, "Network connectivity changed");
        }
    }
}

impl Default for WatchNetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkMonitor for WatchNetworkMonitor {
    fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
