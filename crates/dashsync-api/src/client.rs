//! Dashboard backend client.

use crate::transport::{HttpTransport, DEFAULT_TIMEOUT};
use dashsync_core::{
    BotStartRequest, BotStatus, HealthStatus, MemoryEntry, Page, SyncResult, TokenInfo,
    TradingStats,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Response to `POST /api/bot/start` and `POST /api/bot/stop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotCommandAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client for the dashboard backend REST API.
pub struct ApiClient {
    http: HttpTransport,
}

impl ApiClient {
    /// Create a client with the default request timeout.
    ///
    /// # Arguments
    /// * `base_url` - Backend origin (e.g., "http://localhost:3000")
    pub fn new(base_url: impl Into<String>) -> SyncResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        Ok(Self {
            http: HttpTransport::new(base_url, timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    pub async fn health(&self) -> SyncResult<HealthStatus> {
        self.http.get("/health", &[]).await
    }

    pub async fn start_bot(&self, request: &BotStartRequest) -> SyncResult<BotCommandAck> {
        info!(strategy = ?request.strategy, tokens = request.tokens.len(), dry_run = request.dry_run, "Starting bot");
        self.http.post("/api/bot/start", Some(request)).await
    }

    pub async fn stop_bot(&self) -> SyncResult<BotCommandAck> {
        info!("Stopping bot");
        self.http.post::<(), _>("/api/bot/stop", None).await
    }

    pub async fn bot_status(&self) -> SyncResult<BotStatus> {
        self.http.get("/api/bot/status", &[]).await
    }

    pub async fn memory(&self, limit: u32, offset: u32) -> SyncResult<Page<MemoryEntry>> {
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        self.http.get("/api/memory", &query).await
    }

    pub async fn discover_tokens(&self, limit: u32) -> SyncResult<Page<TokenInfo>> {
        self.http
            .get("/api/tokens/discover", &[("limit", limit.to_string())])
            .await
    }

    pub async fn trading_stats(&self) -> SyncResult<TradingStats> {
        self.http.get("/api/stats/trading", &[]).await
    }
}
