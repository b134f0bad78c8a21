//! Core types for the dashsync data-synchronization layer.
//!
//! This crate provides the pieces every other layer builds on:
//! - `SyncError`: error taxonomy with transient/fatal classification
//! - `RetryPolicy`, `RetryExecutor`: bounded retries with exponential backoff
//! - `Event`, `EventKind`: push events as dispatched to listeners
//! - `PollState`: the observable state shape shared by pollers and the facade
//! - Wire payloads for the backend REST and push surfaces

pub mod error;
pub mod event;
pub mod model;
pub mod retry;
pub mod state;

pub use error::{is_retryable_message, SyncError, SyncResult};
pub use event::{Event, EventKind};
pub use model::{
    BotStartRequest, BotStatus, HealthStatus, MemoryEntry, Opportunity, Page, PriceUpdate,
    TokenInfo, TradeExecuted, TradeSide, TradingStats,
};
pub use retry::{AttemptOutcome, RetryExecutor, RetryObserver, RetryPolicy};
pub use state::{PollState, PollStateView};
