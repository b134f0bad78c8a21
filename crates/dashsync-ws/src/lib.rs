//! Push channel client for the dashboard backend.
//!
//! Provides one persistent WebSocket per backend endpoint with:
//! - Automatic reconnection with bounded exponential backoff
//! - Topic subscriptions that survive disconnection and are replayed on connect
//! - Ordered listener fan-out per event kind
//! - Heartbeat monitoring (ping after silence, pong timeout detection)
//! - An explicit registry handing out one shared manager per endpoint

pub mod channel;
pub mod error;
pub mod heartbeat;
pub mod listener;
pub mod message;
pub mod registry;
pub mod subscription;

pub use channel::{ChannelConfig, ChannelManager, ChannelState, ChannelStatus};
pub use error::{WsError, WsResult};
pub use listener::{Handler, ListenerId, ListenerRegistry};
pub use message::{parse_server_message, ClientMessage};
pub use registry::ChannelRegistry;
pub use subscription::{ConsumerId, SubscriptionSet};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` or `https://` connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
