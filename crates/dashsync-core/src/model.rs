//! Backend resource and push payload types.
//!
//! Field names follow the backend's camelCase JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

// ============================================================================
// Push payloads
// ============================================================================

/// `price_update` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub token_address: String,
    pub price: Decimal,
    #[serde(default)]
    pub price_change_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
}

/// `trade_executed` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeExecuted {
    pub token_address: String,
    pub side: TradeSide,
    pub amount: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub pnl: Option<Decimal>,
}

/// Bot status, from `GET /api/bot/status` and `bot_status_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub running: bool,
    #[serde(default)]
    pub uptime_secs: u64,
    #[serde(default)]
    pub active_positions: u32,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub last_trade_at: Option<DateTime<Utc>>,
}

/// `opportunity_found` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub token_address: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// REST resources
// ============================================================================

/// `GET /health` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// `GET /api/stats/trading` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingStats {
    pub total_trades: u64,
    #[serde(default)]
    pub winning_trades: u64,
    #[serde(default)]
    pub win_rate: f64,
    pub total_pnl: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

/// One entry from `GET /api/memory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry from `GET /api/tokens/discover`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub liquidity: Option<Decimal>,
}

/// Paginated list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether more items exist past `offset + items.len()`.
    pub fn has_more(&self, offset: u64) -> bool {
        offset + (self.items.len() as u64) < self.total
    }
}

/// `POST /api/bot/start` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
}
