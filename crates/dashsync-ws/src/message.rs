//! Push channel wire messages.
//!
//! Every frame is a JSON text frame of the form `{"event": ..., "data": ...}`.

use crate::error::{WsError, WsResult};
use dashsync_core::{Event, EventKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeToken {
        #[serde(rename = "tokenAddress")]
        token_address: String,
    },
    UnsubscribeToken {
        #[serde(rename = "tokenAddress")]
        token_address: String,
    },
    RequestBotStatus {},
}

impl ClientMessage {
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self::SubscribeToken {
            token_address: topic.into(),
        }
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self::UnsubscribeToken {
            token_address: topic.into(),
        }
    }

    pub fn request_bot_status() -> Self {
        Self::RequestBotStatus {}
    }

    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Server-to-client frame before the event kind is resolved.
#[derive(Debug, Deserialize)]
struct RawServerMessage {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse an inbound text frame.
///
/// Returns `Ok(None)` for well-formed frames with an unknown event kind.
/// The topic is `data.tokenAddress` when present, otherwise the kind name.
pub fn parse_server_message(text: &str) -> WsResult<Option<Event<serde_json::Value>>> {
    let raw: RawServerMessage =
        serde_json::from_str(text).map_err(|e| WsError::ParseError(e.to_string()))?;

    let kind: EventKind = match raw.event.parse() {
        Ok(kind) => kind,
        Err(_) => {
            debug!(event = %raw.event, "Ignoring unknown push event");
            return Ok(None);
        }
    };

    let topic = raw
        .data
        .get("tokenAddress")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| kind.as_str().to_string());

    Ok(Some(Event::new(kind, topic, raw.data)))
}
