use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::board::{board, history, process_pending, send_digest};
use super::events::event_stream;
use super::health::{health, stats};
use super::messages::{cancel_message, clear_failed, list_messages, retry_message, send_message};
use super::metrics::prometheus_metrics;

pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health, Stats & Metrics
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        .nest(
            "/api/v1",
            Router::new()
                // Queue
                .route("/messages", get(list_messages).post(send_message))
                .route("/messages/failed", delete(clear_failed))
                .route("/messages/{id}", delete(cancel_message))
                .route("/messages/{id}/retry", post(retry_message))
                // Board content
                .route("/board", get(board))
                .route("/history", get(history))
                .route("/digest", post(send_digest))
                // Background trigger
                .route("/process", post(process_pending))
                // Live events
                .route("/events", get(event_stream))
                .route_layer(middleware::from_fn_with_state(state, api_key_auth)),
        )
}
