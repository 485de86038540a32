//! Delivery error taxonomy.

use thiserror::Error;

use crate::board::ValidationIssue;
use crate::client::ApiError;
use crate::credentials::CredentialError;
use crate::queue::QueueError;

/// Errors surfaced by the delivery subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Queue already holds its maximum number of messages
    #[error("Message queue is full")]
    QueueFull,

    /// Identical text is already waiting to be sent
    #[error("An identical message is already pending")]
    DuplicateMessage,

    /// Text cannot be shown on the board
    #[error("Invalid message: {0}")]
    Validation(String),

    /// Board content changed since it was last observed
    #[error("Board content changed since last sync")]
    ConflictDetected,

    #[error("Invalid API credentials")]
    Unauthorized,

    #[error("Rate limited by board API")]
    RateLimited,

    #[error("Board API server error ({0})")]
    ServerError(u16),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    /// No credentials configured
    #[error("Board credentials are not configured")]
    NotConfigured,

    /// Unexpected API behaviour (unknown status, unreadable response)
    #[error("Board API error: {0}")]
    Api(String),

    /// Queue storage failed
    #[error("Queue storage error: {0}")]
    Storage(String),

    /// Referenced message is not queued
    #[error("Message not found")]
    NotFound,

    /// Operation not allowed in the message's current state
    #[error("{0}")]
    InvalidState(String),
}

impl DeliveryError {
    /// Whether the failed attempt should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError(_) | Self::NetworkError(_) | Self::Timeout
        )
    }

    /// Actionable text for the user.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::QueueFull => "Wait for queued messages to send, or cancel some.",
            Self::DuplicateMessage => "This message is already queued.",
            Self::Validation(_) => "Fix the message: remove unsupported characters or shorten it.",
            Self::ConflictDetected => {
                "The board was changed by someone else. Review it, then retry or cancel the message."
            }
            Self::Unauthorized => "Invalid API credentials. Please check your API key and secret.",
            Self::RateLimited => "Too many requests. Please wait a moment and try again.",
            Self::ServerError(_) => "Vestaboard server error. Please try again later.",
            Self::NetworkError(_) => "No internet connection. Please check your network settings.",
            Self::Timeout => "Request timed out. Please check your connection.",
            Self::NotConfigured => "Please configure your Vestaboard credentials.",
            Self::Api(_) => "Received invalid response from server.",
            Self::Storage(_) => "Failed to save the message queue. Please try again.",
            Self::NotFound => "The message is no longer queued.",
            Self::InvalidState(_) => "Only failed or held messages can be retried.",
        }
    }

    /// Short label used in metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::DuplicateMessage => "duplicate_message",
            Self::Validation(_) => "validation",
            Self::ConflictDetected => "conflict_detected",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::ServerError(_) => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::Timeout => "timeout",
            Self::NotConfigured => "not_configured",
            Self::Api(_) => "api",
            Self::Storage(_) => "storage",
            Self::NotFound => "not_found",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<ApiError> for DeliveryError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Unauthorized => Self::Unauthorized,
            ApiError::RateLimited => Self::RateLimited,
            ApiError::ServerError(code) => Self::ServerError(code),
            ApiError::NetworkError(msg) => Self::NetworkError(msg),
            ApiError::Timeout => Self::Timeout,
            ApiError::InvalidMessage(msg) => Self::Validation(msg),
            ApiError::InvalidResponse(msg) => Self::Api(msg),
            ApiError::Http(code) => Self::Api(format!("unexpected HTTP status {}", code)),
        }
    }
}

impl From<QueueError> for DeliveryError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::QueueFull { .. } => Self::QueueFull,
            QueueError::DuplicateMessage => Self::DuplicateMessage,
            QueueError::NotFound(_) => Self::NotFound,
            e @ QueueError::InvalidState { .. } => Self::InvalidState(e.to_string()),
            QueueError::Persistence(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<CredentialError> for DeliveryError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::NotFound => Self::NotConfigured,
            CredentialError::Store(msg) => {
                tracing::warn!(error = %msg, "Credential store failed");
                Self::NotConfigured
            }
        }
    }
}

impl From<ValidationIssue> for DeliveryError {
    fn from(issue: ValidationIssue) -> Self {
        Self::Validation(issue.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(DeliveryError::RateLimited.is_retryable());
        assert!(DeliveryError::ServerError(502).is_retryable());
        assert!(DeliveryError::NetworkError("offline".into()).is_retryable());
        assert!(DeliveryError::Timeout.is_retryable());

        assert!(!DeliveryError::Unauthorized.is_retryable());
        assert!(!DeliveryError::Validation("bad".into()).is_retryable());
        assert!(!DeliveryError::NotConfigured.is_retryable());
        assert!(!DeliveryError::ConflictDetected.is_retryable());
        assert!(!DeliveryError::Api("weird".into()).is_retryable());
    }

    #[test]
    fn test_api_error_mapping() {
        assert_eq!(DeliveryError::from(ApiError::Unauthorized), DeliveryError::Unauthorized);
        assert_eq!(
            DeliveryError::from(ApiError::InvalidMessage("x".into())),
            DeliveryError::Validation("x".into())
        );
        assert!(matches!(DeliveryError::from(ApiError::Http(418)), DeliveryError::Api(_)));
    }

    #[test]
    fn test_queue_error_mapping() {
        assert_eq!(
            DeliveryError::from(QueueError::QueueFull { size: 1, max: 1 }),
            DeliveryError::QueueFull
        );
        assert_eq!(
            DeliveryError::from(QueueError::DuplicateMessage),
            DeliveryError::DuplicateMessage
        );
        assert_eq!(
            DeliveryError::from(CredentialError::NotFound),
            DeliveryError::NotConfigured
        );
    }

    #[test]
    fn test_guidance_is_actionable() {
        assert!(DeliveryError::Unauthorized.guidance().contains("credentials"));
        assert!(DeliveryError::Validation("x".into()).guidance().contains("Fix the message"));
    }
}
