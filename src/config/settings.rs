use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::client::HttpClientConfig;
use crate::delivery::{BackgroundConfig, DeliveryConfiguration, DeliveryStrategy};
use crate::digest::DigestConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub board: BoardApiSettings,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub digest: DigestSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub background: BackgroundSettings,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Local control surface authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Required `X-API-Key` value for `/api/v1`; unset disables the guard
    pub key: Option<String>,
}

/// Remote board API
#[derive(Debug, Clone, Deserialize)]
pub struct BoardApiSettings {
    #[serde(default = "default_board_url")]
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout: u64,
    /// Environment variable holding the API key
    #[serde(default = "default_key_var")]
    pub key_var: String,
    /// Environment variable holding the API secret
    #[serde(default = "default_secret_var")]
    pub secret_var: String,
    /// Deliver to an in-memory board instead of the remote API
    #[serde(default)]
    pub simulate: bool,
}

/// Delivery tuning. A preset is applied first, then any explicit field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliverySettings {
    /// `default`, `conservative`, `aggressive` or `balanced`
    pub preset: Option<String>,
    pub strategy: Option<String>,
    pub max_retries: Option<u32>,
    /// Seconds
    pub base_delay: Option<u64>,
    /// Seconds
    pub max_backoff: Option<u64>,
    pub backoff_jitter: Option<f64>,
    pub max_queue_size: Option<usize>,
    /// Seconds
    pub max_message_age: Option<u64>,
    /// Milliseconds
    pub pacing_delay_ms: Option<u64>,
    /// Seconds
    pub poll_interval: Option<u64>,
    /// Seconds
    pub request_timeout: Option<u64>,
    /// Seconds
    pub cleanup_interval: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigestSettings {
    /// Seconds between messages that still count as one burst
    #[serde(default = "default_burst_window")]
    pub burst_window: u64,
    #[serde(default = "default_max_in_digest")]
    pub max_messages_in_digest: usize,
    #[serde(default = "default_chars_per_line")]
    pub max_characters_per_line: usize,
    /// Seconds of history examined for a burst
    #[serde(default = "default_recent_window")]
    pub recent_window: u64,
    #[serde(default = "default_min_for_digest")]
    pub min_messages_for_digest: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// `memory`, `file` or `redis`
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Directory used by the file backend
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
}

/// Connectivity probe
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_true")]
    pub probe_enabled: bool,
    /// Host to probe; defaults to the board API host
    pub probe_host: Option<String>,
    #[serde(default = "default_probe_port")]
    pub probe_port: u16,
    /// Seconds between probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval: u64,
    /// Seconds before a probe counts as offline
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundSettings {
    /// Execution window in seconds
    #[serde(default = "default_budget")]
    pub budget: u64,
    /// Seconds reserved before the hard cutoff
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u64,
}

/// OpenTelemetry export
#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_board_url() -> String {
    HttpClientConfig::default().base_url
}

fn default_request_timeout() -> u64 {
    30
}

fn default_key_var() -> String {
    crate::credentials::DEFAULT_KEY_VAR.to_string()
}

fn default_secret_var() -> String {
    crate::credentials::DEFAULT_SECRET_VAR.to_string()
}

fn default_burst_window() -> u64 {
    120 // 2 minutes
}

fn default_max_in_digest() -> usize {
    4
}

fn default_chars_per_line() -> usize {
    20
}

fn default_recent_window() -> u64 {
    300 // 5 minutes
}

fn default_min_for_digest() -> usize {
    3
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_directory() -> String {
    "data".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_prefix() -> String {
    "courier".to_string()
}

fn default_true() -> bool {
    true
}

fn default_probe_port() -> u16 {
    443
}

fn default_probe_interval() -> u64 {
    15
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_budget() -> u64 {
    25
}

fn default_safety_margin() -> u64 {
    2
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "board-courier".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("storage.backend", "memory")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // COURIER__SERVER__PORT, COURIER__DELIVERY__MAX_RETRIES, etc.
            .add_source(
                Environment::with_prefix("COURIER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn is_production() -> bool {
        env::var("RUN_MODE").map(|m| m == "production").unwrap_or(false)
    }
}

impl BoardApiSettings {
    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout),
        }
    }

    /// Host part of `base_url`, used as the default probe target
    pub fn host(&self) -> Option<String> {
        let rest = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        let authority = rest.split('/').next().unwrap_or_default();
        let host = authority.split(':').next().unwrap_or_default();
        (!host.is_empty()).then(|| host.to_string())
    }
}

impl DeliverySettings {
    /// Resolve into the immutable configuration handed to the orchestrator.
    pub fn to_configuration(&self) -> Result<DeliveryConfiguration, ConfigError> {
        let preset = self.preset.as_deref().unwrap_or("default");
        let mut config = DeliveryConfiguration::preset(preset)
            .ok_or_else(|| ConfigError::Message(format!("unknown delivery preset: {preset}")))?;

        if let Some(name) = &self.strategy {
            let strategy = DeliveryStrategy::from_name(name).ok_or_else(|| {
                ConfigError::Message(format!("unknown delivery strategy: {name}"))
            })?;
            config.strategy = strategy;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.base_delay {
            config.base_delay = Duration::from_secs(v);
        }
        if let Some(v) = self.max_backoff {
            config.max_backoff = Duration::from_secs(v);
        }
        if let Some(v) = self.backoff_jitter {
            config.backoff_jitter = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.max_queue_size {
            config.max_queue_size = v;
        }
        if let Some(v) = self.max_message_age {
            config.max_message_age = Duration::from_secs(v);
        }
        if let Some(v) = self.pacing_delay_ms {
            config.pacing_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval = Duration::from_secs(v.max(1));
        }
        if let Some(v) = self.request_timeout {
            config.request_timeout = Duration::from_secs(v.max(1));
        }
        if let Some(v) = self.cleanup_interval {
            config.cleanup_interval = Duration::from_secs(v.max(1));
        }

        Ok(config)
    }
}

impl DigestSettings {
    pub fn to_config(&self) -> DigestConfig {
        DigestConfig {
            burst_window: Duration::from_secs(self.burst_window),
            max_messages_in_digest: self.max_messages_in_digest,
            max_characters_per_line: self.max_characters_per_line,
            recent_window: Duration::from_secs(self.recent_window),
            min_messages_for_digest: self.min_messages_for_digest,
            ..DigestConfig::default()
        }
    }
}

impl NetworkSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.max(1))
    }
}

impl BackgroundSettings {
    pub fn to_config(&self) -> BackgroundConfig {
        BackgroundConfig {
            budget: Duration::from_secs(self.budget),
            safety_margin: Duration::from_secs(self.safety_margin),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for BoardApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_board_url(),
            timeout: default_request_timeout(),
            key_var: default_key_var(),
            secret_var: default_secret_var(),
            simulate: false,
        }
    }
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            burst_window: default_burst_window(),
            max_messages_in_digest: default_max_in_digest(),
            max_characters_per_line: default_chars_per_line(),
            recent_window: default_recent_window(),
            min_messages_for_digest: default_min_for_digest(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            directory: default_directory(),
            redis_url: default_redis_url(),
            redis_prefix: default_redis_prefix(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            probe_enabled: true,
            probe_host: None,
            probe_port: default_probe_port(),
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            safety_margin: default_safety_margin(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
