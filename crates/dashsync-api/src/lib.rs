//! REST clients for dashsync.
//!
//! - `ApiClient`: the dashboard backend (bot control, stats, memory, tokens)
//! - `ClobBridgeClient`: the CLOB bridge (balance, orders, positions, books)
//!
//! Both map transport and HTTP failures into `SyncError` so callers can wrap
//! them in a `RetryExecutor` directly.

pub mod bridge;
pub mod client;
mod transport;

pub use bridge::{
    Balance, CancelAck, ClobBridgeClient, Order, OrderAck, OrderBook, OrderList, OrderRequest,
    Position, PositionList, PriceLevel,
};
pub use client::{ApiClient, BotCommandAck};
pub use transport::DEFAULT_TIMEOUT;
