//! reqwest-backed board API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ApiError, BoardApi};
use crate::board::{BoardSnapshot, Grid};
use crate::credentials::Credentials;
use crate::metrics::ApiMetrics;

/// Header carrying the read/write key
pub const API_KEY_HEADER: &str = "X-Vestaboard-Read-Write-Key";

/// Header carrying the API secret
pub const API_SECRET_HEADER: &str = "X-Vestaboard-Api-Secret";

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the read/write API
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rw.vestaboard.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WrappedResponse {
    current_message: Option<CurrentMessage>,
}

#[derive(Debug, Deserialize)]
struct CurrentMessage {
    layout: Option<String>,
}

/// Board API client over HTTPS.
pub struct HttpBoardClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpBoardClient {
    /// Create a client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        credentials: &Credentials,
        body: &T,
    ) -> Result<(), ApiError> {
        let result = self
            .client
            .post(&self.config.base_url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .header(API_SECRET_HEADER, &credentials.api_secret)
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let error = map_transport_error(e);
                ApiMetrics::request("post", error.kind());
                return Err(error);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status.as_u16(), &body);
            ApiMetrics::request("post", error.kind());
            return Err(error);
        }

        ApiMetrics::request("post", "ok");
        Ok(())
    }
}

#[async_trait]
impl BoardApi for HttpBoardClient {
    async fn post_message(&self, credentials: &Credentials, text: &str) -> Result<(), ApiError> {
        if text.is_empty() {
            return Err(ApiError::InvalidMessage(
                "Message text cannot be empty".to_string(),
            ));
        }

        tracing::debug!(chars = text.chars().count(), "Posting text to board");
        self.post_json(credentials, &TextBody { text }).await
    }

    async fn current_board(&self, credentials: &Credentials) -> Result<BoardSnapshot, ApiError> {
        let result = self
            .client
            .get(&self.config.base_url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .header(API_SECRET_HEADER, &credentials.api_secret)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let error = map_transport_error(e);
                ApiMetrics::request("get", error.kind());
                return Err(error);
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        if !status.is_success() {
            let error = ApiError::from_status(status.as_u16(), &body);
            ApiMetrics::request("get", error.kind());
            return Err(error);
        }

        let parsed = parse_board_body(&body);
        ApiMetrics::request(
            "get",
            match &parsed {
                Ok(_) => "ok",
                Err(e) => e.kind(),
            },
        );
        parsed.map(BoardSnapshot::new)
    }
}

fn map_transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::NetworkError(error.to_string())
    }
}

/// Parse a board read response: either a bare grid or a wrapped layout string.
pub(crate) fn parse_board_body(body: &str) -> Result<Grid, ApiError> {
    if let Ok(rows) = serde_json::from_str::<Grid>(body) {
        return Ok(rows);
    }

    let wrapped: WrappedResponse =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

    let layout = wrapped
        .current_message
        .and_then(|m| m.layout)
        .ok_or_else(|| ApiError::InvalidResponse("missing currentMessage.layout".to_string()))?;

    serde_json::from_str::<Grid>(&layout).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}
