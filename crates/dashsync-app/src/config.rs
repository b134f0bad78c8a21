//! Application configuration.

use crate::error::{AppError, AppResult};
use dashsync_core::RetryPolicy;
use dashsync_ws::ChannelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST endpoints.
    #[serde(default)]
    pub api: ApiConfig,
    /// Push channel. An empty `url` runs every stream poll-only.
    #[serde(default = "default_channel")]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    /// Retry policy wrapped around every REST fetch.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Snapshot HTTP server.
    #[serde(default)]
    pub server: ServerConfig,
    /// Tokens whose prices are followed.
    #[serde(default)]
    pub watch: WatchConfig,
}

/// REST endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Dashboard backend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// CLOB bridge base URL. Empty disables the account streams.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_bridge_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_channel() -> ChannelConfig {
    ChannelConfig {
        url: "ws://localhost:3001".to_string(),
        ..ChannelConfig::default()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bridge_url: default_bridge_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Polling intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fallback interval for live streams while the channel is down.
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    /// Interval of the poll-only trading stats stream.
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
    /// Interval of the bridge balance and positions streams.
    #[serde(default = "default_account_interval_ms")]
    pub account_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    30_000
}

fn default_stats_interval_ms() -> u64 {
    60_000
}

fn default_account_interval_ms() -> u64 {
    15_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            account_interval_ms: default_account_interval_ms(),
        }
    }
}

impl PollingConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn account_interval(&self) -> Duration {
        Duration::from_millis(self.account_interval_ms)
    }
}

/// Snapshot server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_server_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            port: default_port(),
        }
    }
}

/// Price watch list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Token addresses to follow.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Page size used when resolving a token price over REST.
    #[serde(default = "default_discover_limit")]
    pub discover_limit: u32,
}

fn default_discover_limit() -> u32 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            discover_limit: default_discover_limit(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            channel: default_channel(),
            polling: PollingConfig::default(),
            retry: RetryPolicy::default(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `DASHSYNC_CONFIG` or `config/default.toml`.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("DASHSYNC_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_or_default(&config_path)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later at runtime.
    pub fn validate(&self) -> AppResult<()> {
        if self.api.base_url.is_empty() {
            return Err(AppError::Config("api.base_url must not be empty".to_string()));
        }
        if self.api.timeout_ms == 0 {
            return Err(AppError::Config("api.timeout_ms must be > 0".to_string()));
        }
        if self.polling.default_interval_ms == 0
            || self.polling.stats_interval_ms == 0
            || self.polling.account_interval_ms == 0
        {
            return Err(AppError::Config("polling intervals must be > 0".to_string()));
        }
        let url = &self.channel.url;
        if !url.is_empty() && !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "channel.url must be ws:// or wss://, got {url}"
            )));
        }
        Ok(())
    }

    /// Whether the CLOB bridge account streams run.
    pub fn bridge_enabled(&self) -> bool {
        !self.api.bridge_url.is_empty()
    }

    /// Whether a push channel is configured.
    pub fn push_enabled(&self) -> bool {
        !self.channel.url.is_empty()
    }
}
