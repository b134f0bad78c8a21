//! Push events.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kinds of server-to-client events on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TradeExecuted,
    BotStatusUpdate,
    PriceUpdate,
    OpportunityFound,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        Self::TradeExecuted,
        Self::BotStatusUpdate,
        Self::PriceUpdate,
        Self::OpportunityFound,
    ];

    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TradeExecuted => "trade_executed",
            Self::BotStatusUpdate => "bot_status_update",
            Self::PriceUpdate => "price_update",
            Self::OpportunityFound => "opportunity_found",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SyncError::Decode(format!("unknown event kind: {s}")))
    }
}

/// A single inbound event. Dispatched to listeners, never retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event<T> {
    pub kind: EventKind,
    pub topic: String,
    pub payload: T,
    pub received_at: DateTime<Utc>,
}

impl<T> Event<T> {
    pub fn new(kind: EventKind, topic: impl Into<String>, payload: T) -> Self {
        Self {
            kind,
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

impl Event<serde_json::Value> {
    /// Decode the raw JSON payload into a typed event.
    pub fn decode<U: DeserializeOwned>(&self) -> SyncResult<Event<U>> {
        let payload = serde_json::from_value(self.payload.clone())?;
        Ok(Event {
            kind: self.kind,
            topic: self.topic.clone(),
            payload,
            received_at: self.received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceUpdate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("order_filled".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_decode_price_update() {
        let raw = Event::new(
            EventKind::PriceUpdate,
            "0xabc",
            json!({"tokenAddress": "0xabc", "price": "1.25"}),
        );

        let typed: Event<PriceUpdate> = raw.decode().unwrap();
        assert_eq!(typed.topic, "0xabc");
        assert_eq!(typed.payload.price, dec!(1.25));
        assert_eq!(typed.received_at, raw.received_at);
    }

    #[test]
    fn test_decode_mismatch_is_decode_error() {
        let raw = Event::new(EventKind::PriceUpdate, "0xabc", json!({"unexpected": true}));
        let result: SyncResult<Event<PriceUpdate>> = raw.decode();
        assert!(matches!(result, Err(SyncError::Decode(_))));
    }
}
