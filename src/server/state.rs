use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Settings;
use crate::delivery::{BackgroundProcessor, DeliveryOrchestrator, EventBroadcaster};
use crate::storage::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<DeliveryOrchestrator>,
    pub background: Arc<BackgroundProcessor>,
    pub events: Arc<EventBroadcaster>,
    pub store: Arc<dyn StateStore>,
    /// Fires once when the process starts shutting down
    pub shutdown: broadcast::Sender<()>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        orchestrator: Arc<DeliveryOrchestrator>,
        background: Arc<BackgroundProcessor>,
        events: Arc<EventBroadcaster>,
        store: Arc<dyn StateStore>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            orchestrator,
            background,
            events,
            store,
            shutdown,
            start_time: Instant::now(),
        }
    }
}
