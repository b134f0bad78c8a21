//! Live streams against a real push channel and a local push server.

mod common;

use common::{wait_until, PushServer};
use dashsync_core::{EventKind, PriceUpdate, RetryPolicy, SyncResult};
use dashsync_live::{LiveDataFacade, PollOptions, PushSource};
use dashsync_ws::{ChannelConfig, ChannelManager};
use rust_decimal_macros::dec;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

type FetchFuture = Pin<Box<dyn Future<Output = SyncResult<PriceUpdate>> + Send>>;

fn price_fetch(calls: Arc<AtomicU32>) -> impl Fn() -> FetchFuture + Send + Sync {
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {
            Ok(PriceUpdate {
                token_address: "0xabc".to_string(),
                price: dec!(1.00),
                price_change_24h: None,
                volume_24h: None,
            })
        })
    }
}

/// Fetch that resolves after `delay` with a fixed price.
fn slow_price_fetch(
    calls: Arc<AtomicU32>,
    delay: Duration,
) -> impl Fn() -> FetchFuture + Send + Sync {
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(PriceUpdate {
                token_address: "0xabc".to_string(),
                price: dec!(1.00),
                price_change_24h: None,
                volume_24h: None,
            })
        })
    }
}

fn channel(url: String, initial_delay_ms: u64) -> Arc<ChannelManager> {
    Arc::new(ChannelManager::new(ChannelConfig {
        url,
        reconnect: RetryPolicy::new(10, initial_delay_ms, initial_delay_ms * 4, 2.0).unwrap(),
        ..Default::default()
    }))
}

async fn until_connected(channel: &Arc<ChannelManager>) -> bool {
    let channel = channel.clone();
    wait_until(WAIT, move || {
        let channel = channel.clone();
        async move { channel.is_connected() }
    })
    .await
}

#[tokio::test]
async fn test_connected_stream_fetches_once_then_follows_push() {
    let server = PushServer::start().await;
    let channel = channel(server.url(), 20);
    channel.connect();
    assert!(until_connected(&channel).await);

    let facade = LiveDataFacade::new(Some(channel.clone()));
    let calls = Arc::new(AtomicU32::new(0));
    let stream = facade
        .live(
            PushSource::topic(EventKind::PriceUpdate, "0xabc"),
            price_fetch(calls.clone()),
            PollOptions::every(Duration::from_millis(50)).named("price"),
        )
        .unwrap();

    let mut rx = stream.subscribe();
    rx.wait_for(|s| s.data.is_some()).await.unwrap();
    assert!(!stream.is_polling());

    let server_ref = &server;
    assert!(
        wait_until(WAIT, move || async move {
            !server_ref.received_events("subscribe_token").await.is_empty()
        })
        .await
    );

    server.push("price_update", json!({"tokenAddress": "0xother", "price": "9.99"}));
    server.push("price_update", json!({"tokenAddress": "0xabc", "price": "1.25"}));
    rx.wait_for(|s| s.data.as_ref().map(|p| p.price) == Some(dec!(1.25)))
        .await
        .unwrap();

    server.push("price_update", json!({"tokenAddress": "0xABC", "price": "1.50"}));
    rx.wait_for(|s| s.data.as_ref().map(|p| p.price) == Some(dec!(1.50)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    drop(stream);
    assert!(!channel.is_subscribed("0xabc"));

    let server_ref = &server;
    assert!(
        wait_until(WAIT, move || async move {
            !server_ref.received_events("unsubscribe_token").await.is_empty()
        })
        .await
    );
    channel.disconnect();
}

#[tokio::test]
async fn test_polling_covers_reconnect_gap() {
    let server = PushServer::start().await;
    let channel = channel(server.url(), 400);
    channel.connect();
    assert!(until_connected(&channel).await);

    let facade = LiveDataFacade::new(Some(channel.clone()));
    let calls = Arc::new(AtomicU32::new(0));
    let stream = facade
        .live(
            PushSource::topic(EventKind::PriceUpdate, "0xabc"),
            price_fetch(calls.clone()),
            PollOptions::every(Duration::from_millis(50)).named("price"),
        )
        .unwrap();

    let calls_clone = calls.clone();
    assert!(
        wait_until(WAIT, move || {
            let calls = calls_clone.clone();
            async move { calls.load(Ordering::SeqCst) >= 1 }
        })
        .await
    );

    server.drop_connections();

    let calls_clone = calls.clone();
    assert!(
        wait_until(WAIT, move || {
            let calls = calls_clone.clone();
            async move { calls.load(Ordering::SeqCst) >= 3 }
        })
        .await
    );

    assert!(until_connected(&channel).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stream.is_polling());

    stream.close();
    channel.disconnect();
}

#[tokio::test]
async fn test_disconnected_channel_polls() {
    let facade = LiveDataFacade::new(Some(channel("ws://127.0.0.1:9".to_string(), 20)));
    let calls = Arc::new(AtomicU32::new(0));

    let stream = facade
        .live(
            PushSource::kind(EventKind::PriceUpdate),
            price_fetch(calls.clone()),
            PollOptions::every(Duration::from_millis(30)).named("price"),
        )
        .unwrap();

    let calls_clone = calls.clone();
    assert!(
        wait_until(WAIT, move || {
            let calls = calls_clone.clone();
            async move { calls.load(Ordering::SeqCst) >= 3 }
        })
        .await
    );
    assert!(stream.is_polling());
}

#[tokio::test]
async fn test_push_during_slow_fetch_is_not_overwritten() {
    let server = PushServer::start().await;
    let channel = channel(server.url(), 20);
    channel.connect();
    assert!(until_connected(&channel).await);

    let facade = LiveDataFacade::new(Some(channel.clone()));
    let calls = Arc::new(AtomicU32::new(0));
    let stream = facade
        .live(
            PushSource::topic(EventKind::PriceUpdate, "0xabc"),
            slow_price_fetch(calls.clone(), Duration::from_millis(400)),
            PollOptions::every(Duration::from_secs(60)).named("price"),
        )
        .unwrap();

    // The initial fetch is outstanding; a push lands before it resolves.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(stream.snapshot().data.is_none());
    server.push("price_update", json!({"tokenAddress": "0xabc", "price": "1.25"}));

    let mut rx = stream.subscribe();
    rx.wait_for(|s| s.data.as_ref().map(|p| p.price) == Some(dec!(1.25)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = stream.snapshot();
    assert_eq!(state.data.map(|p| p.price), Some(dec!(1.25)));
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    stream.close();
    channel.disconnect();
}
