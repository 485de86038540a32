//! Queue endpoints: submit, inspect, cancel and retry messages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::QueueState;
use crate::error::Result;
use crate::queue::{MessagePriority, QueueStats, QueuedMessage};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    #[serde(default)]
    pub priority: MessagePriority,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: Uuid,
    pub state: QueueState,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<QueuedMessage>,
    pub stats: QueueStats,
}

#[derive(Debug, Serialize)]
pub struct ClearFailedResponse {
    pub removed: usize,
}

/// POST /api/v1/messages
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>)> {
    let id = state
        .orchestrator
        .send_message_with_priority(&request.text, request.priority)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendMessageResponse {
            id,
            state: state.orchestrator.state(),
        }),
    ))
}

/// GET /api/v1/messages
pub async fn list_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    let queue = state.orchestrator.queue();

    Json(MessagesResponse {
        messages: queue.all_messages().await,
        stats: queue.stats().await,
    })
}

/// DELETE /api/v1/messages/{id}
pub async fn cancel_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.orchestrator.cancel_message(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/messages/{id}/retry
pub async fn retry_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.orchestrator.retry_message(id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/v1/messages/failed
pub async fn clear_failed(State(state): State<AppState>) -> Json<ClearFailedResponse> {
    let removed = state.orchestrator.clear_failed_messages().await;
    Json(ClearFailedResponse { removed })
}
