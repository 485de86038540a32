//! Board content, history, digest and background processing endpoints.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::board::{BoardSnapshot, HistoryEntry};
use crate::delivery::BackgroundRunResult;
use crate::error::{AppError, Result};
use crate::server::AppState;

/// Upper bound on a caller-supplied processing window
const MAX_PROCESS_BUDGET_SECS: u64 = 300;

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub snapshot: Option<BoardSnapshot>,
    pub text: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct DigestResponse {
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessQuery {
    /// Execution window in seconds; defaults to the configured budget
    pub budget: Option<u64>,
}

/// GET /api/v1/board
pub async fn board(State(state): State<AppState>) -> Result<Json<BoardResponse>> {
    let cache = state.orchestrator.cache();

    let snapshot = cache
        .last_known_board()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let last_sync = cache
        .last_sync_time()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(BoardResponse {
        text: snapshot.as_ref().map(BoardSnapshot::text),
        snapshot,
        last_sync,
    }))
}

/// GET /api/v1/history
pub async fn history(State(state): State<AppState>) -> Result<Json<HistoryResponse>> {
    let entries = state
        .orchestrator
        .cache()
        .history()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(HistoryResponse { entries }))
}

/// POST /api/v1/digest
pub async fn send_digest(State(state): State<AppState>) -> Result<Json<DigestResponse>> {
    let id = state.orchestrator.send_digest_if_burst().await?;
    Ok(Json(DigestResponse {
        queued: id.is_some(),
        id,
    }))
}

/// POST /api/v1/process
///
/// Entry point for an external scheduler granting a bounded execution window.
pub async fn process_pending(
    State(state): State<AppState>,
    Query(query): Query<ProcessQuery>,
) -> Json<BackgroundRunResult> {
    let result = match query.budget {
        Some(secs) => {
            let budget = Duration::from_secs(secs.clamp(1, MAX_PROCESS_BUDGET_SECS));
            state.background.process_pending_within(budget).await
        }
        None => state.background.process_pending_now().await,
    };

    Json(result)
}
