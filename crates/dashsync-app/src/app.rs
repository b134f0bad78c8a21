//! Application wiring and lifecycle.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::server::{self, ServerState};
use dashsync_api::{ApiClient, Balance, ClobBridgeClient, PositionList};
use dashsync_core::{
    BotStatus, EventKind, PollStateView, PriceUpdate, RetryExecutor, RetryPolicy, SyncError,
    SyncResult, TradingStats,
};
use dashsync_live::{LiveDataFacade, LiveStream, PollOptions, PushSource};
use dashsync_telemetry::Metrics;
use dashsync_ws::{ChannelManager, ChannelRegistry, ChannelState, ChannelStatus, ListenerId};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    api: Arc<ApiClient>,
    bridge: Option<Arc<ClobBridgeClient>>,
    registry: ChannelRegistry,
    channel: Option<Arc<ChannelManager>>,
    facade: LiveDataFacade,
    executor: Arc<RetryExecutor>,
}

impl Application {
    /// Build clients and the shared channel. Nothing connects yet.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let api = Arc::new(ApiClient::with_timeout(
            config.api.base_url.clone(),
            config.api.timeout(),
        )?);

        let bridge = if config.bridge_enabled() {
            Some(Arc::new(ClobBridgeClient::with_timeout(
                config.api.bridge_url.clone(),
                config.api.timeout(),
            )?))
        } else {
            None
        };

        let registry = ChannelRegistry::new(config.channel.clone());
        let channel = config
            .push_enabled()
            .then(|| registry.get_or_create(&config.channel.url));

        let facade = LiveDataFacade::new(channel.clone())
            .with_default_interval(config.polling.default_interval());

        // The executor logs each retry itself; the observer only counts them.
        let executor = Arc::new(RetryExecutor::new().with_observer(Arc::new(
            |_attempt: u32, error: &SyncError, _delay: Duration| {
                Metrics::retry(error.kind());
            },
        )));

        info!(
            base_url = %config.api.base_url,
            channel = %config.channel.url,
            push = channel.is_some(),
            bridge = bridge.is_some(),
            tokens = config.watch.tokens.len(),
            "Application initialized"
        );

        Ok(Self {
            config,
            api,
            bridge,
            registry,
            channel,
            facade,
            executor,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn channel(&self) -> Option<&Arc<ChannelManager>> {
        self.channel.as_ref()
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Check the backend once. Failure is logged, not fatal; the streams
    /// keep polling until it comes up.
    pub async fn check_backend(&self) -> bool {
        let api = self.api.clone();
        let result = self
            .executor
            .execute(
                || {
                    let api = api.clone();
                    async move { api.health().await }
                },
                &self.config.retry,
            )
            .await;

        match result {
            Ok(health) if health.is_ok() => {
                info!(status = %health.status, "Backend healthy");
                true
            }
            Ok(health) => {
                warn!(status = %health.status, "Backend reports degraded health");
                false
            }
            Err(e) => {
                warn!(error = %e, "Backend health check failed, continuing");
                false
            }
        }
    }

    /// Start every configured stream.
    pub fn start_streams(&self) -> AppResult<Streams> {
        let bot_status = {
            let api = self.api.clone();
            self.facade.live(
                PushSource::kind(EventKind::BotStatusUpdate),
                self.retrying(move || {
                    let api = api.clone();
                    async move { api.bot_status().await }
                }),
                self.facade.options("bot_status"),
            )?
        };

        let trading_stats = {
            let api = self.api.clone();
            self.facade.poll(
                self.retrying(move || {
                    let api = api.clone();
                    async move { api.trading_stats().await }
                }),
                PollOptions::every(self.config.polling.stats_interval()).named("trading_stats"),
            )?
        };

        let mut prices = BTreeMap::new();
        for token in &self.config.watch.tokens {
            let api = self.api.clone();
            let address = token.clone();
            let limit = self.config.watch.discover_limit;
            let stream = self.facade.live(
                PushSource::topic(EventKind::PriceUpdate, token.clone()),
                self.retrying(move || {
                    let api = api.clone();
                    let address = address.clone();
                    async move { token_price(&api, &address, limit).await }
                }),
                self.facade.options(format!("price:{token}")),
            )?;
            prices.insert(token.clone(), stream);
        }

        let (balance, positions) = match &self.bridge {
            Some(bridge) => {
                let balance = {
                    let bridge = bridge.clone();
                    self.facade.poll(
                        self.retrying(move || {
                            let bridge = bridge.clone();
                            async move { bridge.balance().await }
                        }),
                        PollOptions::every(self.config.polling.account_interval())
                            .named("balance"),
                    )?
                };
                let positions = {
                    let bridge = bridge.clone();
                    self.facade.poll(
                        self.retrying(move || {
                            let bridge = bridge.clone();
                            async move { bridge.positions().await }
                        }),
                        PollOptions::every(self.config.polling.account_interval())
                            .named("positions"),
                    )?
                };
                (Some(balance), Some(positions))
            }
            None => (None, None),
        };

        info!(prices = prices.len(), account = balance.is_some(), "Streams started");
        Ok(Streams {
            bot_status,
            trading_stats,
            prices,
            balance,
            positions,
            channel: self.channel.clone(),
        })
    }

    /// Wrap a fetch so transient failures are retried under the configured
    /// policy before a poll cycle records them.
    fn retrying<T, F, Fut>(
        &self,
        fetch: F,
    ) -> impl Fn() -> BoxFuture<'static, SyncResult<T>> + Send + Sync + 'static
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let executor = self.executor.clone();
        let policy: RetryPolicy = self.config.retry;
        let fetch = Arc::new(fetch);
        move || {
            let executor = executor.clone();
            let fetch = fetch.clone();
            async move {
                executor
                    .execute_transient_only(|| fetch(), &policy)
                    .await
            }
            .boxed()
        }
    }

    /// Log channel status changes for operators.
    fn watch_channel(&self) -> Option<ListenerId> {
        let channel = self.channel.as_ref()?;
        let url = channel.url().to_string();
        Some(channel.on_status(move |status| match status {
            ChannelStatus::StateChanged(state) => {
                info!(url = %url, state = %state, "Push channel state changed");
            }
            ChannelStatus::ConnectivityLost(e) => {
                error!(url = %url, error = %e, "Push channel gave up, streams stay on polling");
            }
        }))
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.check_backend().await;

        let streams = Arc::new(self.start_streams()?);
        let status_listener = self.watch_channel();
        if let Some(channel) = &self.channel {
            channel.connect();
        }

        let shutdown = CancellationToken::new();
        let server_handle = if self.config.server.enabled {
            let state = ServerState::new(streams.clone());
            let port = self.config.server.port;
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = server::run_server(state, port, token).await {
                    error!(error = %e, "Snapshot server failed");
                }
            }))
        } else {
            None
        };

        info!("Running, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        streams.close();
        if let (Some(channel), Some(id)) = (&self.channel, status_listener) {
            channel.off(id);
        }
        self.registry.disconnect_all();
        shutdown.cancel();

        if let Some(handle) = server_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Snapshot server task failed to join");
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Resolve one token's price from the discovery listing.
async fn token_price(api: &ApiClient, address: &str, limit: u32) -> SyncResult<PriceUpdate> {
    let page = api.discover_tokens(limit).await?;
    page.items
        .into_iter()
        .find(|token| token.address.eq_ignore_ascii_case(address))
        .and_then(|token| {
            token.price.map(|price| PriceUpdate {
                token_address: token.address,
                price,
                price_change_24h: None,
                volume_24h: None,
            })
        })
        .ok_or_else(|| SyncError::Client {
            status: 404,
            message: format!("no price listed for token {address}"),
        })
}

/// Running streams of the application.
pub struct Streams {
    pub bot_status: LiveStream<BotStatus>,
    pub trading_stats: LiveStream<TradingStats>,
    /// Keyed by token address.
    pub prices: BTreeMap<String, LiveStream<PriceUpdate>>,
    /// Bridge account streams, present when a bridge URL is configured.
    pub balance: Option<LiveStream<Balance>>,
    pub positions: Option<LiveStream<PositionList>>,
    channel: Option<Arc<ChannelManager>>,
}

impl Streams {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            channel: self.channel.as_ref().map(|channel| ChannelSnapshot {
                url: channel.url().to_string(),
                state: channel.state(),
                reconnect_attempts: channel.reconnect_attempts(),
                subscriptions: channel.subscriptions(),
            }),
            bot_status: self.bot_status.view(),
            trading_stats: self.trading_stats.view(),
            prices: self
                .prices
                .iter()
                .map(|(token, stream)| (token.clone(), stream.view()))
                .collect(),
            balance: self.balance.as_ref().map(LiveStream::view),
            positions: self.positions.as_ref().map(LiveStream::view),
        }
    }

    /// Close every stream. Idempotent.
    pub fn close(&self) {
        self.bot_status.close();
        self.trading_stats.close();
        for stream in self.prices.values() {
            stream.close();
        }
        if let Some(stream) = &self.balance {
            stream.close();
        }
        if let Some(stream) = &self.positions {
            stream.close();
        }
    }
}

/// JSON body of `GET /api/snapshot`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub channel: Option<ChannelSnapshot>,
    pub bot_status: PollStateView<BotStatus>,
    pub trading_stats: PollStateView<TradingStats>,
    pub prices: BTreeMap<String, PollStateView<PriceUpdate>>,
    pub balance: Option<PollStateView<Balance>>,
    pub positions: Option<PollStateView<PositionList>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub url: String,
    pub state: ChannelState,
    pub reconnect_attempts: u32,
    pub subscriptions: Vec<String>,
}
