//! Credential provider for the board API.
//!
//! Credentials are looked up on every delivery attempt, so a provider may be
//! reconfigured at runtime without restarting the orchestrator.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default environment variable holding the API key
pub const DEFAULT_KEY_VAR: &str = "BOARD_API_KEY";

/// Default environment variable holding the API secret
pub const DEFAULT_SECRET_VAR: &str = "BOARD_API_SECRET";

/// Errors returned by credential providers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No credentials have been configured
    #[error("Board credentials not found")]
    NotFound,

    /// Underlying credential store failed
    #[error("Credential store error: {0}")]
    Store(String),
}

/// Key and secret pair for the board API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &"***")
            .finish()
    }
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}***", visible)
}

/// Source of board API credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Fetch the current credentials.
    async fn retrieve(&self) -> Result<Credentials, CredentialError>;

    /// Whether credentials are currently available.
    async fn is_configured(&self) -> bool {
        self.retrieve().await.is_ok()
    }
}

/// Credentials held in memory, replaceable at runtime.
#[derive(Default)]
pub struct StaticCredentialProvider {
    credentials: RwLock<Option<Credentials>>,
}

impl StaticCredentialProvider {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Replace the stored credentials.
    pub async fn set(&self, credentials: Credentials) {
        *self.credentials.write().await = Some(credentials);
    }

    /// Forget the stored credentials.
    pub async fn clear(&self) {
        *self.credentials.write().await = None;
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn retrieve(&self) -> Result<Credentials, CredentialError> {
        self.credentials
            .read()
            .await
            .clone()
            .ok_or(CredentialError::NotFound)
    }
}

/// Credentials read from environment variables on each lookup.
pub struct EnvCredentialProvider {
    key_var: String,
    secret_var: String,
}

impl EnvCredentialProvider {
    pub fn new(key_var: impl Into<String>, secret_var: impl Into<String>) -> Self {
        Self {
            key_var: key_var.into(),
            secret_var: secret_var.into(),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_VAR, DEFAULT_SECRET_VAR)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn retrieve(&self) -> Result<Credentials, CredentialError> {
        let key = std::env::var(&self.key_var).ok().filter(|v| !v.trim().is_empty());
        let secret = std::env::var(&self.secret_var)
            .ok()
            .filter(|v| !v.trim().is_empty());

        match (key, secret) {
            (Some(key), Some(secret)) => Ok(Credentials::new(key, secret)),
            _ => Err(CredentialError::NotFound),
        }
    }
}
