//! Push channel manager.
//!
//! Owns one WebSocket to a backend endpoint. Handles the connection
//! lifecycle, automatic reconnection with bounded exponential backoff,
//! subscription replay after (re)connection and listener fan-out.
//!
//! State machine:
//! `Disconnected -> Connecting -> Connected -> Reconnecting -> Connected`,
//! and `Reconnecting -> Disconnected` once the reconnect budget is spent.

use crate::error::{WsError, WsResult};
use crate::heartbeat::Heartbeat;
use crate::listener::{ListenerId, ListenerRegistry};
use crate::message::{parse_server_message, ClientMessage};
use crate::subscription::{ConsumerId, SubscriptionSet};
use dashsync_core::{Event, EventKind, RetryPolicy, SyncError};
use dashsync_telemetry::Metrics;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async_tls_with_config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Push channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    #[serde(default)]
    pub url: String,
    /// Reconnect backoff. `max_attempts` is the reconnect budget.
    #[serde(default = "default_reconnect_policy")]
    pub reconnect: RetryPolicy,
    /// Send a ping after this much inbound silence.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// Capacity of the outbound message queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_reconnect_policy() -> RetryPolicy {
    RetryPolicy::new(10, 1000, 30_000, 2.0).unwrap_or_default()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: default_reconnect_policy(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ChannelState {
    pub const ALL: [ChannelState; 4] = [
        Self::Disconnected,
        Self::Connecting,
        Self::Connected,
        Self::Reconnecting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivered to status listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    StateChanged(ChannelState),
    /// The reconnect budget is spent; `connect()` must be called again.
    ConnectivityLost(SyncError),
}

/// One connect..disconnect lifetime.
struct Session {
    id: u64,
    token: CancellationToken,
}

/// Push channel manager.
///
/// Share it behind an `Arc`; `ChannelRegistry` hands out one per endpoint.
pub struct ChannelManager {
    config: ChannelConfig,
    state: RwLock<ChannelState>,
    subscriptions: SubscriptionSet,
    events: ListenerRegistry<EventKind, Event<serde_json::Value>>,
    status: ListenerRegistry<(), ChannelStatus>,
    /// Held across a state change and its dispatch so status listeners see
    /// changes in the order they were applied. Re-entrant for handlers that
    /// call back into the manager.
    status_order: ReentrantMutex<()>,
    heartbeat: Heartbeat,
    reconnect_count: RwLock<u32>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: TokioMutex<mpsc::Receiver<ClientMessage>>,
    session: Mutex<Option<Session>>,
    next_session_id: AtomicU64,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        let heartbeat = Heartbeat::new(
            Duration::from_millis(config.heartbeat_interval_ms),
            Duration::from_millis(config.heartbeat_timeout_ms),
        );

        Self {
            config,
            state: RwLock::new(ChannelState::Disconnected),
            subscriptions: SubscriptionSet::new(),
            events: ListenerRegistry::new(),
            status: ListenerRegistry::new(),
            status_order: ReentrantMutex::new(()),
            heartbeat,
            reconnect_count: RwLock::new(0),
            outbound_tx,
            outbound_rx: TokioMutex::new(outbound_rx),
            session: Mutex::new(None),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Consecutive failed connection attempts since the last success.
    pub fn reconnect_attempts(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Active topics in sorted order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.topics()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start a session in the background.
    ///
    /// Returns `false` (and does nothing) if a session is already active.
    /// Must be called from within a tokio runtime.
    pub fn connect(self: &Arc<Self>) -> bool {
        let (id, token) = {
            let mut session = self.session.lock();
            if session.is_some() {
                debug!(url = %self.config.url, "Push channel session already active");
                return false;
            }
            let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            *session = Some(Session {
                id,
                token: token.clone(),
            });
            (id, token)
        };

        *self.reconnect_count.write() = 0;
        self.transition(&token, ChannelState::Connecting);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_session(id, token).await;
        });
        true
    }

    /// Close intentionally and suppress reconnection. Idempotent.
    pub fn disconnect(&self) {
        let Some(session) = self.session.lock().take() else {
            debug!(url = %self.config.url, "Push channel already disconnected");
            return;
        };

        info!(url = %self.config.url, "Push channel disconnect requested");
        session.token.cancel();
        self.force_state(ChannelState::Disconnected);
    }

    async fn run_session(self: Arc<Self>, session_id: u64, token: CancellationToken) {
        loop {
            if token.is_cancelled() {
                return;
            }

            let result = self.try_connect(&token).await;

            if token.is_cancelled() {
                info!(url = %self.config.url, "Push channel closed");
                return;
            }

            let reason = match &result {
                Ok(()) => {
                    info!(url = %self.config.url, "Push channel closed by server");
                    "closed"
                }
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "Push channel connection error");
                    e.reason()
                }
            };

            let attempt = {
                let mut count = self.reconnect_count.write();
                *count += 1;
                *count
            };

            let budget = self.config.reconnect.max_attempts();
            if attempt > budget {
                error!(attempts = budget, "Push channel reconnect budget exhausted");
                self.finish_exhausted(session_id, budget);
                return;
            }

            self.transition(&token, ChannelState::Reconnecting);
            Metrics::channel_reconnect(reason);

            let delay = self.config.reconnect.delay_for_attempt(attempt);
            warn!(
                attempt,
                budget,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting push channel"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = token.cancelled() => {
                    info!("Disconnect requested during backoff");
                    return;
                }
            }
        }
    }

    async fn try_connect(&self, token: &CancellationToken) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting push channel");

        let (ws_stream, _response) = tokio::select! {
            result = connect_async_tls_with_config(&self.config.url, None, true, None) => {
                result.map_err(|e| WsError::ConnectionFailed(e.to_string()))?
            }
            () = token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();
        let mut outbound_rx = self.outbound_rx.lock().await;

        if !self.transition(token, ChannelState::Connected) {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }
        *self.reconnect_count.write() = 0;
        self.heartbeat.reset();
        info!(url = %self.config.url, "Push channel connected");

        // Queued messages predate this connection; the replay supersedes them.
        let mut stale = 0usize;
        while outbound_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(stale, "Discarded queued messages from previous connection");
        }

        self.replay_subscriptions(&mut write).await?;

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(token, &text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            if let Some(rtt) = self.heartbeat.record_pong() {
                                Metrics::heartbeat_rtt(rtt.as_secs_f64() * 1000.0);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason): (u16, String) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Push channel closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {
                            self.heartbeat.record_activity();
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Push channel read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Push channel stream ended");
                            return Ok(());
                        }
                    }
                }

                outbound = outbound_rx.recv() => {
                    if let Some(msg) = outbound {
                        write.send(Message::Text(msg.to_json()?)).await?;
                        debug!(?msg, "Sent push channel message");
                    }
                }

                () = tokio::time::sleep(self.heartbeat.check_period()) => {
                    if self.heartbeat.is_timed_out() {
                        error!("Push channel heartbeat timeout");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("Sent heartbeat ping");
                    }
                }
            }
        }
    }

    fn handle_text(&self, token: &CancellationToken, text: &str) {
        self.heartbeat.record_activity();

        match parse_server_message(text) {
            Ok(Some(event)) => {
                if token.is_cancelled() {
                    return;
                }
                Metrics::push_event(event.kind.as_str());
                let listeners = self.events.dispatch(event.kind, &event);
                debug!(kind = %event.kind, topic = %event.topic, listeners, "Dispatched push event");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dropping malformed push frame"),
        }
    }

    async fn replay_subscriptions<S>(&self, write: &mut S) -> WsResult<()>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let topics = self.subscriptions.topics();
        info!(count = topics.len(), "Replaying subscriptions");

        for topic in topics {
            let text = ClientMessage::subscribe(topic).to_json()?;
            write.send(Message::Text(text)).await?;
        }
        Ok(())
    }

    /// Apply a transition unless the session has been cancelled.
    fn transition(&self, token: &CancellationToken, next: ChannelState) -> bool {
        let _order = self.status_order.lock();
        {
            let mut state = self.state.write();
            if token.is_cancelled() {
                return false;
            }
            if *state == next {
                return true;
            }
            debug!(from = %*state, to = %next, "Push channel state transition");
            *state = next;
        }
        Metrics::channel_state_set(next.as_str());
        self.status.dispatch((), &ChannelStatus::StateChanged(next));
        true
    }

    fn force_state(&self, next: ChannelState) {
        let _order = self.status_order.lock();
        let changed = {
            let mut state = self.state.write();
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            Metrics::channel_state_set(next.as_str());
            self.status.dispatch((), &ChannelStatus::StateChanged(next));
        }
    }

    fn finish_exhausted(&self, session_id: u64, attempts: u32) {
        {
            let mut session = self.session.lock();
            match session.as_ref() {
                Some(current) if current.id == session_id => {
                    current.token.cancel();
                    *session = None;
                }
                // Superseded by disconnect() or a newer session.
                _ => return,
            }
        }

        let _order = self.status_order.lock();
        self.force_state(ChannelState::Disconnected);
        self.status.dispatch(
            (),
            &ChannelStatus::ConnectivityLost(SyncError::ConnectivityLost { attempts }),
        );
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Subscribe with plain set semantics.
    pub fn subscribe(&self, topic: impl Into<String>) {
        self.subscribe_for(ConsumerId::ANONYMOUS, topic);
    }

    pub fn unsubscribe(&self, topic: &str) {
        self.unsubscribe_for(ConsumerId::ANONYMOUS, topic);
    }

    /// Register `consumer`'s interest in `topic`.
    ///
    /// The subscribe request goes out immediately when connected and the
    /// topic was not already active; otherwise it is sent on next connect.
    pub fn subscribe_for(&self, consumer: ConsumerId, topic: impl Into<String>) {
        let topic = topic.into();
        if !self.subscriptions.add(consumer, &topic) {
            debug!(%topic, %consumer, "Topic already active");
            return;
        }

        if self.is_connected() {
            self.enqueue_logged(ClientMessage::subscribe(topic));
        } else {
            debug!(%topic, "Subscription deferred until connected");
        }
    }

    /// Drop `consumer`'s interest in `topic`. No-op if it had none.
    pub fn unsubscribe_for(&self, consumer: ConsumerId, topic: &str) {
        if !self.subscriptions.remove(consumer, topic) {
            return;
        }

        if self.is_connected() {
            self.enqueue_logged(ClientMessage::unsubscribe(topic));
        }
    }

    /// Drop every interest held by `consumer`.
    pub fn release_consumer(&self, consumer: ConsumerId) {
        let deactivated = self.subscriptions.remove_consumer(consumer);
        if !self.is_connected() {
            return;
        }
        for topic in deactivated {
            self.enqueue_logged(ClientMessage::unsubscribe(topic));
        }
    }

    /// Ask the server to push a `bot_status_update`.
    ///
    /// # Errors
    /// `WsError::NotConnected` unless the channel is connected.
    pub fn request_bot_status(&self) -> WsResult<()> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }
        self.enqueue(ClientMessage::request_bot_status())
    }

    fn enqueue(&self, msg: ClientMessage) -> WsResult<()> {
        self.outbound_tx
            .try_send(msg)
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    fn enqueue_logged(&self, msg: ClientMessage) {
        // The next replay restores anything dropped here.
        if let Err(e) = self.enqueue(msg) {
            warn!(error = %e, "Failed to queue subscription message");
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a handler for every inbound event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&Event<serde_json::Value>) + Send + Sync + 'static,
    {
        self.events.add(kind, Arc::new(handler))
    }

    /// Register a handler for state changes and connectivity loss.
    pub fn on_status<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ChannelStatus) + Send + Sync + 'static,
    {
        self.status.add((), Arc::new(handler))
    }

    /// Remove a handler registered with `on` or `on_status`.
    pub fn off(&self, id: ListenerId) -> bool {
        self.events.remove(id) || self.status.remove(id)
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.token.cancel();
        }
    }
}
