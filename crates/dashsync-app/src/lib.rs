//! dashsync host application.
//!
//! Wires the sync layer to a dashboard backend:
//! - REST client and shared push channel from TOML configuration
//! - Live streams for bot status, trading stats and watched token prices
//! - Snapshot, metrics and health endpoints over HTTP

pub mod app;
pub mod config;
pub mod error;
pub mod server;

pub use app::{Application, ChannelSnapshot, Snapshot, Streams};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
