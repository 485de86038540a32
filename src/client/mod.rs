//! Board API client abstraction.
//!
//! The delivery core talks to the remote board only through [`BoardApi`], so
//! tests and alternate transports can stand in for [`HttpBoardClient`].

mod http;
mod simulated;

pub use http::{HttpBoardClient, HttpClientConfig};
pub use simulated::SimulatedBoard;

use async_trait::async_trait;
use thiserror::Error;

use crate::board::BoardSnapshot;
use crate::credentials::Credentials;

/// Failure kinds reported by the board API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Key or secret rejected (401/403)
    #[error("Unauthorized: check board API credentials")]
    Unauthorized,

    /// Too many requests (429)
    #[error("Rate limited by board API")]
    RateLimited,

    /// Server-side failure (5xx)
    #[error("Board API server error: {0}")]
    ServerError(u16),

    /// Request could not reach the API
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request did not complete in time
    #[error("Board API request timed out")]
    Timeout,

    /// Message refused by the API (400/422)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Response body could not be understood
    #[error("Invalid response from board API: {0}")]
    InvalidResponse(String),

    /// Any other unexpected status
    #[error("Unexpected HTTP status {0}")]
    Http(u16),
}

impl ApiError {
    /// Map a non-success HTTP status to a failure kind.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ApiError::Unauthorized,
            429 => ApiError::RateLimited,
            400 | 422 => ApiError::InvalidMessage(if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            }),
            500..=599 => ApiError::ServerError(status),
            other => ApiError::Http(other),
        }
    }

    /// Whether another attempt could succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited
                | ApiError::ServerError(_)
                | ApiError::NetworkError(_)
                | ApiError::Timeout
        )
    }

    /// Short label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::RateLimited => "rate_limited",
            ApiError::ServerError(_) => "server_error",
            ApiError::NetworkError(_) => "network_error",
            ApiError::Timeout => "timeout",
            ApiError::InvalidMessage(_) => "invalid_message",
            ApiError::InvalidResponse(_) => "invalid_response",
            ApiError::Http(_) => "http",
        }
    }
}

/// Read/write access to the remote board.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Post text to the board.
    async fn post_message(&self, credentials: &Credentials, text: &str) -> Result<(), ApiError>;

    /// Fetch what the board currently shows.
    async fn current_board(&self, credentials: &Credentials) -> Result<BoardSnapshot, ApiError>;

    /// Check credentials by reading the board.
    async fn test_connection(&self, credentials: &Credentials) -> Result<(), ApiError> {
        self.current_board(credentials).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from_status(401, ""), ApiError::Unauthorized);
        assert_eq!(ApiError::from_status(403, ""), ApiError::Unauthorized);
        assert_eq!(ApiError::from_status(429, ""), ApiError::RateLimited);
        assert_eq!(ApiError::from_status(503, ""), ApiError::ServerError(503));
        assert_eq!(
            ApiError::from_status(400, "bad text"),
            ApiError::InvalidMessage("bad text".to_string())
        );
        assert_eq!(
            ApiError::from_status(422, ""),
            ApiError::InvalidMessage("HTTP 422".to_string())
        );
        assert_eq!(ApiError::from_status(404, ""), ApiError::Http(404));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ApiError::RateLimited.is_retryable());
        assert!(ApiError::ServerError(500).is_retryable());
        assert!(ApiError::NetworkError("reset".into()).is_retryable());
        assert!(ApiError::Timeout.is_retryable());
        assert!(!ApiError::Unauthorized.is_retryable());
        assert!(!ApiError::InvalidMessage("x".into()).is_retryable());
        assert!(!ApiError::Http(404).is_retryable());
    }
}
