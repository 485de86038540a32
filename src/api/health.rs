//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::delivery::QueueState;
use crate::queue::QueueStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub state: QueueState,
    pub connected: bool,
    pub storage: StorageHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct StorageHealthResponse {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub queue: QueueStats,
    pub state: QueueState,
    pub delivering: bool,
    pub strategy: String,
    pub event_subscribers: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    let connected = orchestrator.network().is_connected();
    let queue_state = orchestrator.state();

    let status = if connected { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        state: queue_state,
        connected,
        storage: StorageHealthResponse {
            backend: state.store.backend_name().to_string(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let orchestrator = &state.orchestrator;

    Json(StatsResponse {
        queue: orchestrator.queue().stats().await,
        state: orchestrator.state(),
        delivering: orchestrator.is_delivering(),
        strategy: orchestrator.config().strategy.name().to_string(),
        event_subscribers: state.events.subscriber_count(),
    })
}
