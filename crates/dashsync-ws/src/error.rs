//! Push channel error types.

use dashsync_core::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Not connected")]
    NotConnected,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for WsError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Tungstenite(Box::new(e))
    }
}

impl WsError {
    /// Short label for the reconnect metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "connect_failed",
            Self::ConnectionClosed { .. } => "server_close",
            Self::SendFailed(_) => "send_failed",
            Self::ParseError(_) | Self::Json(_) => "parse_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::NotConnected => "not_connected",
            Self::Tungstenite(_) => "transport",
        }
    }
}

impl From<WsError> for SyncError {
    fn from(e: WsError) -> Self {
        match e {
            WsError::NotConnected => SyncError::NotConnected,
            WsError::ParseError(msg) => SyncError::Decode(msg),
            WsError::Json(e) => SyncError::Decode(e.to_string()),
            other => SyncError::TransientNetwork(other.to_string()),
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
