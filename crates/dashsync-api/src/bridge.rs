//! CLOB bridge client and resources.
//!
//! The bridge speaks snake_case JSON and exposes the authenticated order
//! book client: balance, open orders, positions, order placement and
//! cancellation.

use crate::transport::{HttpTransport, DEFAULT_TIMEOUT};
use dashsync_core::{HealthStatus, SyncError, SyncResult, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// `GET /balance` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub usdc_balance: Decimal,
    pub address: String,
}

/// One open order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub side: Option<TradeSide>,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub total: u64,
}

/// One open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub side: Option<TradeSide>,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub entry_price: Decimal,
    #[serde(default)]
    pub current_price: Decimal,
    #[serde(default)]
    pub pnl: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionList {
    pub positions: Vec<Position>,
    pub total: u64,
}

/// Body for `POST /order/market` and `POST /order/limit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub token_id: String,
    pub side: TradeSide,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(token_id: impl Into<String>, side: TradeSide, amount: Decimal) -> Self {
        Self {
            token_id: token_id.into(),
            side,
            amount,
            price: None,
        }
    }

    pub fn limit(
        token_id: impl Into<String>,
        side: TradeSide,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            price: Some(price),
            ..Self::market(token_id, side, amount)
        }
    }
}

/// Order placement acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Market orders only.
    #[serde(default)]
    pub filled_amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub success: bool,
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// `GET /markets/{token_id}/orderbook` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    #[serde(default)]
    pub spread: Decimal,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.iter().max_by(|a, b| a.price.cmp(&b.price))
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.iter().min_by(|a, b| a.price.cmp(&b.price))
    }
}

/// Client for the CLOB bridge service.
pub struct ClobBridgeClient {
    http: HttpTransport,
}

impl ClobBridgeClient {
    /// # Arguments
    /// * `base_url` - Bridge origin (e.g., "http://localhost:8001")
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

    pub async fn balance(&self) -> SyncResult<Balance> {
        self.http.get("/balance", &[]).await
    }

    pub async fn open_orders(&self) -> SyncResult<OrderList> {
        self.http.get("/orders", &[]).await
    }

    pub async fn positions(&self) -> SyncResult<PositionList> {
        self.http.get("/positions", &[]).await
    }

    pub async fn place_market_order(&self, request: &OrderRequest) -> SyncResult<OrderAck> {
        info!(token_id = %request.token_id, side = ?request.side, amount = %request.amount, "Placing market order");
        self.http.post("/order/market", Some(request)).await
    }

    /// # Errors
    /// `SyncError::Validation` without sending anything if `price` is unset.
    pub async fn place_limit_order(&self, request: &OrderRequest) -> SyncResult<OrderAck> {
        let Some(price) = request.price else {
            return Err(SyncError::Validation(
                "price is required for limit orders".to_string(),
            ));
        };

        info!(token_id = %request.token_id, side = ?request.side, amount = %request.amount, %price, "Placing limit order");
        self.http.post("/order/limit", Some(request)).await
    }

    pub async fn cancel_order(&self, order_id: &str) -> SyncResult<CancelAck> {
        info!(order_id, "Cancelling order");
        self.http.delete(&format!("/order/{order_id}")).await
    }

    pub async fn orderbook(&self, token_id: &str) -> SyncResult<OrderBook> {
        self.http
            .get(&format!("/markets/{token_id}/orderbook"), &[])
            .await
    }
}
