use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::Settings;
use crate::delivery::DeliveryError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance: Option<&'static str>,
}

fn delivery_status(error: &DeliveryError) -> StatusCode {
    match error {
        DeliveryError::Validation(_) => StatusCode::BAD_REQUEST,
        DeliveryError::NotFound => StatusCode::NOT_FOUND,
        DeliveryError::DuplicateMessage
        | DeliveryError::InvalidState(_)
        | DeliveryError::ConflictDetected => StatusCode::CONFLICT,
        DeliveryError::QueueFull | DeliveryError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        DeliveryError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        DeliveryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DeliveryError::Unauthorized
        | DeliveryError::ServerError(_)
        | DeliveryError::NetworkError(_)
        | DeliveryError::Api(_) => StatusCode::BAD_GATEWAY,
        DeliveryError::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let production = Settings::is_production();
        let mut guidance = None;

        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = if production {
                    "Configuration error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR".to_string(), client_msg, log_msg)
            }
            AppError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED".to_string(),
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND".to_string(),
                msg.clone(),
                msg.clone(),
            ),
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = if production {
                    "Internal server error".to_string()
                } else {
                    log_msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR".to_string(), client_msg, log_msg)
            }
            AppError::Delivery(e) => {
                let status = delivery_status(e);
                let log_msg = e.to_string();
                let client_msg = if production && status.is_server_error() {
                    e.guidance().to_string()
                } else {
                    log_msg.clone()
                };
                guidance = Some(e.guidance());
                (status, e.kind().to_ascii_uppercase(), client_msg, log_msg)
            }
        };

        // Always log the detailed error server-side
        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message: client_message,
                guidance,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_status_mapping() {
        assert_eq!(
            AppError::from(DeliveryError::Validation("x".into())).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(DeliveryError::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(DeliveryError::DuplicateMessage).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(DeliveryError::QueueFull).into_response().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_auth_status() {
        let response = AppError::Auth("missing key".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
