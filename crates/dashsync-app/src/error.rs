//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync error: {0}")]
    Sync(#[from] dashsync_core::SyncError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<dashsync_ws::WsError>),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] dashsync_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
