//! In-process board for local development and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ApiError, BoardApi};
use crate::board::{charset, BoardSnapshot, Grid};
use crate::credentials::Credentials;

/// A board that lives in memory.
///
/// Posts update the displayed grid the way the real board would. Failures and
/// latency can be scripted, and [`set_text`](Self::set_text) simulates another
/// user changing the board.
pub struct SimulatedBoard {
    board: Mutex<BoardSnapshot>,
    post_failures: Mutex<VecDeque<ApiError>>,
    read_failures: Mutex<VecDeque<ApiError>>,
    posted: Mutex<Vec<String>>,
    latency_ms: AtomicU64,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self {
            board: Mutex::new(BoardSnapshot::blank()),
            post_failures: Mutex::new(VecDeque::new()),
            read_failures: Mutex::new(VecDeque::new()),
            posted: Mutex::new(Vec::new()),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Fail the next post with `error`. Calls queue up in order.
    pub async fn fail_next_post(&self, error: ApiError) {
        self.post_failures.lock().await.push_back(error);
    }

    /// Fail the next board read with `error`.
    pub async fn fail_next_read(&self, error: ApiError) {
        self.read_failures.lock().await.push_back(error);
    }

    /// Delay applied to every call
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Change the board behind the courier's back.
    pub async fn set_text(&self, text: &str) {
        *self.board.lock().await = BoardSnapshot::new(charset::board_layout(text));
    }

    /// Texts accepted so far, oldest first
    pub async fn posted(&self) -> Vec<String> {
        self.posted.lock().await.clone()
    }

    pub async fn snapshot(&self) -> BoardSnapshot {
        self.board.lock().await.clone()
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn accept(&self, text: String, grid: Grid) -> Result<(), ApiError> {
        if let Some(error) = self.post_failures.lock().await.pop_front() {
            return Err(error);
        }

        tracing::debug!(text = %text, "Simulated board updated");
        *self.board.lock().await = BoardSnapshot::new(grid);
        self.posted.lock().await.push(text);
        Ok(())
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoardApi for SimulatedBoard {
    async fn post_message(&self, _credentials: &Credentials, text: &str) -> Result<(), ApiError> {
        self.simulate_latency().await;
        charset::validate(text).map_err(|issue| ApiError::InvalidMessage(issue.to_string()))?;
        self.accept(text.to_string(), charset::board_layout(text))
            .await
    }

    async fn current_board(&self, _credentials: &Credentials) -> Result<BoardSnapshot, ApiError> {
        self.simulate_latency().await;
        if let Some(error) = self.read_failures.lock().await.pop_front() {
            return Err(error);
        }
        Ok(self.board.lock().await.clone())
    }
}
