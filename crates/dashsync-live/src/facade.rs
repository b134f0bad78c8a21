//! Live data facade.
//!
//! Consumers ask for "X every N ms" (`poll`) or "X whenever it changes"
//! (`live`). A live stream subscribes on the push channel and keeps its
//! poller disabled while the channel is connected; polling supplies the
//! initial value and covers any period without a connection. Both sources
//! feed one merged `PollState<T>` through the rule in `merge`.

use crate::merge::{apply_error, apply_update, UpdateSource};
use crate::poll::{CycleHook, PollCycle, PollOptions, PollingController, DEFAULT_INTERVAL};
use dashsync_core::{EventKind, PollState, PollStateView, SyncResult};
use dashsync_ws::{ChannelManager, ChannelState, ChannelStatus, ConsumerId, ListenerId};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Push events that update a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSource {
    pub kind: EventKind,
    /// Only events with this topic apply; `None` accepts every event of
    /// `kind` and subscribes to nothing.
    pub topic: Option<String>,
}

impl PushSource {
    pub fn kind(kind: EventKind) -> Self {
        Self { kind, topic: None }
    }

    pub fn topic(kind: EventKind, topic: impl Into<String>) -> Self {
        Self {
            kind,
            topic: Some(topic.into()),
        }
    }
}

/// Factory for merged live streams.
#[derive(Clone)]
pub struct LiveDataFacade {
    channel: Option<Arc<ChannelManager>>,
    default_interval: Duration,
}

impl LiveDataFacade {
    /// `channel` is the push source; `None` makes every stream poll-only.
    pub fn new(channel: Option<Arc<ChannelManager>>) -> Self {
        Self {
            channel,
            default_interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    pub fn channel(&self) -> Option<&Arc<ChannelManager>> {
        self.channel.as_ref()
    }

    /// Poll options named `name` at the default interval.
    pub fn options(&self, name: impl Into<String>) -> PollOptions {
        PollOptions::every(self.default_interval).named(name)
    }

    /// A stream refreshed only by polling.
    ///
    /// # Errors
    /// `SyncError::Validation` for a zero interval.
    pub fn poll<T, F, Fut>(&self, fetch: F, options: PollOptions) -> SyncResult<LiveStream<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let name = options.name.clone();
        let merged = merged_state();
        let poller = PollingController::start_with_hook(fetch, options, Some(poll_hook(&merged)))?;

        info!(stream = %name, "Poll stream started");
        Ok(LiveStream {
            name,
            merged,
            poller: Arc::new(poller),
            channel: None,
            consumer: ConsumerId::new(),
            listeners: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A stream refreshed by push events, with polling as fallback.
    ///
    /// Falls back to `poll` when the facade has no channel.
    ///
    /// # Errors
    /// `SyncError::Validation` for a zero interval.
    pub fn live<T, F, Fut>(
        &self,
        source: PushSource,
        fetch: F,
        options: PollOptions,
    ) -> SyncResult<LiveStream<T>>
    where
        T: Clone + Send + Sync + DeserializeOwned + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        let Some(channel) = self.channel.clone() else {
            debug!(stream = %options.name, "No push channel, stream is poll-only");
            return self.poll(fetch, options);
        };

        let name = options.name.clone();
        let merged = merged_state();
        let poller = Arc::new(PollingController::start_with_hook(
            fetch,
            options.enabled(false),
            Some(poll_hook(&merged)),
        )?);
        let consumer = ConsumerId::new();
        let closed = Arc::new(AtomicBool::new(false));

        // Registered before the state is read so no transition is missed.
        let weak_poller = Arc::downgrade(&poller);
        let status_id = channel.on_status(move |status| {
            if let ChannelStatus::StateChanged(state) = status {
                if let Some(poller) = weak_poller.upgrade() {
                    poller.set_enabled(*state != ChannelState::Connected);
                }
            }
        });

        let push_state = merged.clone();
        let push_closed = closed.clone();
        let push_name = name.clone();
        let topic = source.topic.clone();
        let event_id = channel.on(source.kind, move |event| {
            if push_closed.load(Ordering::SeqCst) {
                return;
            }
            // Token addresses may arrive checksummed (mixed case).
            if topic
                .as_ref()
                .is_some_and(|topic| !topic.eq_ignore_ascii_case(&event.topic))
            {
                return;
            }
            match serde_json::from_value::<T>(event.payload.clone()) {
                Ok(data) => {
                    push_state.send_if_modified(|state| {
                        apply_update(state, UpdateSource::Push, data, event.received_at)
                    });
                }
                Err(e) => {
                    warn!(
                        stream = %push_name,
                        kind = %event.kind,
                        error = %e,
                        "Dropping undecodable push payload"
                    );
                }
            }
        });

        if let Some(topic) = &source.topic {
            channel.subscribe_for(consumer, topic.clone());
        }

        if channel.is_connected() {
            let initial = poller.clone();
            tokio::spawn(async move {
                initial.refetch().await;
            });
        } else {
            poller.set_enabled(true);
        }

        info!(stream = %name, kind = %source.kind, topic = ?source.topic, "Live stream started");
        Ok(LiveStream {
            name,
            merged,
            poller,
            channel: Some(channel),
            consumer,
            listeners: vec![status_id, event_id],
            closed,
        })
    }
}

fn merged_state<T>() -> Arc<watch::Sender<PollState<T>>> {
    let (tx, _) = watch::channel(PollState::default());
    Arc::new(tx)
}

fn poll_hook<T: Clone + Send + Sync + 'static>(
    merged: &Arc<watch::Sender<PollState<T>>>,
) -> CycleHook<T> {
    let merged = merged.clone();
    Arc::new(move |cycle: PollCycle<'_, T>| match cycle {
        PollCycle::Started => {
            merged.send_if_modified(|state| !std::mem::replace(&mut state.loading, true));
        }
        PollCycle::Succeeded { data, at } => {
            merged.send_modify(|state| {
                state.loading = false;
                apply_update(state, UpdateSource::Poll, data.clone(), at);
            });
        }
        PollCycle::Failed(error) => {
            merged.send_modify(|state| {
                state.loading = false;
                apply_error(state, error.clone());
            });
        }
    })
}

/// One merged data stream.
///
/// Dropping the stream closes it.
pub struct LiveStream<T> {
    name: String,
    merged: Arc<watch::Sender<PollState<T>>>,
    poller: Arc<PollingController<T>>,
    channel: Option<Arc<ChannelManager>>,
    consumer: ConsumerId,
    listeners: Vec<ListenerId>,
    closed: Arc<AtomicBool>,
}

impl<T: Clone + Send + Sync + 'static> LiveStream<T> {
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.merged.subscribe()
    }

    pub fn snapshot(&self) -> PollState<T> {
        self.merged.borrow().clone()
    }

    pub fn view(&self) -> PollStateView<T> {
        PollStateView::from(&*self.merged.borrow())
    }

    /// Run an out-of-band poll cycle.
    pub async fn refetch(&self) -> bool {
        self.poller.refetch().await
    }
}

impl<T> LiveStream<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the fallback poller is currently scheduled.
    pub fn is_polling(&self) -> bool {
        self.poller.is_enabled() && !self.poller.is_stopped()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the poller, remove listeners and release topic interest.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.poller.stop();
        if let Some(channel) = &self.channel {
            for id in &self.listeners {
                channel.off(*id);
            }
            channel.release_consumer(self.consumer);
        }
        self.merged
            .send_if_modified(|state| std::mem::replace(&mut state.loading, false));

        debug!(stream = %self.name, "Live stream closed");
    }
}

impl<T> Drop for LiveStream<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashsync_core::SyncError;
    use dashsync_ws::ChannelConfig;
    use std::sync::atomic::AtomicU32;

    fn counter_fetch(
        calls: Arc<AtomicU32>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = SyncResult<u32>> + Send>> + Send + Sync
    {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move { Ok(n) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stream_tracks_poller() {
        let facade = LiveDataFacade::new(None).with_default_interval(Duration::from_millis(500));
        let calls = Arc::new(AtomicU32::new(0));

        let stream = facade
            .poll(counter_fetch(calls.clone()), facade.options("counter"))
            .unwrap();
        let mut rx = stream.subscribe();

        rx.wait_for(|s| s.data == Some(2)).await.unwrap();
        assert!(stream.is_polling());

        stream.close();
        assert!(!stream.is_polling());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_keeps_data() {
        let facade = LiveDataFacade::new(None);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let stream = facade
            .poll(
                move || {
                    let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Ok("first".to_string())
                        } else {
                            Err(SyncError::TransientNetwork("ECONNRESET".to_string()))
                        }
                    }
                },
                PollOptions::every(Duration::from_millis(100)).named("flaky"),
            )
            .unwrap();
        let mut rx = stream.subscribe();

        rx.wait_for(|s| s.error.is_some()).await.unwrap();
        let state = stream.snapshot();
        assert_eq!(state.data.as_deref(), Some("first"));
        assert!(!state.loading);

        let view = stream.view();
        assert!(view.error.unwrap().contains("ECONNRESET"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_without_connection_polls_and_releases_topic() {
        let channel = Arc::new(ChannelManager::new(ChannelConfig::default()));
        let facade = LiveDataFacade::new(Some(channel.clone()));
        let calls = Arc::new(AtomicU32::new(0));

        let stream = facade
            .live::<u32, _, _>(
                PushSource::topic(EventKind::PriceUpdate, "0xabc"),
                counter_fetch(calls.clone()),
                PollOptions::every(Duration::from_millis(100)).named("price"),
            )
            .unwrap();

        assert!(channel.is_subscribed("0xabc"));
        assert!(stream.is_polling());

        let mut rx = stream.subscribe();
        rx.wait_for(|s| s.data.is_some()).await.unwrap();

        drop(stream);
        assert!(!channel.is_subscribed("0xabc"));
    }

    #[tokio::test]
    async fn test_live_without_channel_is_poll_only() {
        let facade = LiveDataFacade::new(None);
        let stream = facade
            .live::<u32, _, _>(
                PushSource::kind(EventKind::BotStatusUpdate),
                || async { Ok(1) },
                facade.options("status"),
            )
            .unwrap();

        assert!(stream.is_polling());
        assert_eq!(stream.name(), "status");
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let facade = LiveDataFacade::new(None);
        let result = facade.poll(|| async { Ok(1u32) }, PollOptions::every(Duration::ZERO));
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }
}
