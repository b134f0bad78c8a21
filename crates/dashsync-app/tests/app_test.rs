//! Host wiring tests against an axum mock backend.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use dashsync_app::server::{self, ServerState};
use dashsync_app::{AppConfig, Application, Streams};
use dashsync_ws::ChannelState;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Backend whose trading stats fail with 503 for the first `stats_failures` calls.
fn backend(stats_failures: usize) -> Router {
    let stats_calls = Arc::new(AtomicUsize::new(0));
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/api/bot/status",
            get(|| async { Json(json!({"running": true, "uptimeSecs": 7})) }),
        )
        .route(
            "/api/stats/trading",
            get(
                move |State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < stats_failures {
                        (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response()
                    } else {
                        Json(json!({"totalTrades": 3, "totalPnl": "12.5"})).into_response()
                    }
                },
            ),
        )
        .route(
            "/api/tokens/discover",
            get(|| async {
                Json(json!({
                    "total": 2,
                    "items": [
                        {"address": "0xAAA", "symbol": "AAA", "price": "1.25"},
                        {"address": "0xbbb", "symbol": "BBB"}
                    ]
                }))
            }),
        )
        .route(
            "/balance",
            get(|| async { Json(json!({"usdc_balance": 125.5, "address": "0xwallet"})) }),
        )
        .route(
            "/positions",
            get(|| async { Json(json!({"positions": [], "total": 0})) }),
        )
        .with_state(stats_calls)
}

fn poll_only_config(base_url: &str) -> AppConfig {
    AppConfig::from_toml(&format!(
        r#"
        [api]
        base_url = "{base_url}"
        bridge_url = "{base_url}"
        timeout_ms = 2000

        [channel]
        url = ""

        [retry]
        max_attempts = 3
        initial_delay_ms = 10
        max_delay_ms = 20

        [server]
        enabled = false

        [watch]
        tokens = ["0xaaa", "0xbbb"]
        "#
    ))
    .unwrap()
}

async fn settled(streams: &Streams) -> bool {
    let snapshot = streams.snapshot();
    snapshot.bot_status.data.is_some()
        && snapshot.trading_stats.data.is_some()
        && snapshot.prices["0xaaa"].data.is_some()
        && snapshot.prices["0xbbb"].error.is_some()
        && snapshot.balance.is_some_and(|balance| balance.data.is_some())
        && snapshot.positions.is_some_and(|positions| positions.data.is_some())
}

#[tokio::test]
async fn test_snapshot_server_over_poll_only_streams() {
    let base_url = spawn(backend(0)).await;
    let app = Application::new(poll_only_config(&base_url)).unwrap();
    assert!(app.channel().is_none());
    assert!(app.check_backend().await);

    let streams = Arc::new(app.start_streams().unwrap());
    assert!(
        wait_until(Duration::from_secs(5), || {
            let streams = streams.clone();
            async move { settled(&streams).await }
        })
        .await
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server::serve(
        listener,
        ServerState::new(streams.clone()),
        shutdown.clone(),
    ));

    let http = reqwest::Client::new();
    let snapshot: Value = http
        .get(format!("http://{addr}/api/snapshot"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(snapshot["channel"].is_null());
    assert_eq!(snapshot["botStatus"]["data"]["running"], true);
    assert_eq!(snapshot["botStatus"]["data"]["uptimeSecs"], 7);
    assert_eq!(snapshot["tradingStats"]["data"]["totalTrades"], 3);
    assert_eq!(snapshot["prices"]["0xaaa"]["data"]["tokenAddress"], "0xAAA");
    assert_eq!(snapshot["prices"]["0xaaa"]["data"]["price"], "1.25");
    assert!(snapshot["prices"]["0xbbb"]["data"].is_null());
    assert_eq!(snapshot["balance"]["data"]["address"], "0xwallet");
    assert_eq!(snapshot["positions"]["data"]["total"], 0);
    assert!(snapshot["prices"]["0xbbb"]["error"]
        .as_str()
        .unwrap()
        .contains("no price listed"));

    let health: Value = http
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["channel"].is_null());

    let metrics = http
        .get(format!("http://{addr}/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(metrics.status(), 200);
    assert!(metrics
        .text()
        .await
        .unwrap()
        .contains("dashsync_poll_outcome_total"));

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    streams.close();
    assert!(streams.bot_status.is_closed());
    assert!(!streams.snapshot().trading_stats.loading);
}

#[tokio::test]
async fn test_transient_failures_retried_inside_one_cycle() {
    let base_url = spawn(backend(2)).await;
    let app = Application::new(poll_only_config(&base_url)).unwrap();
    let streams = app.start_streams().unwrap();

    let mut rx = streams.trading_stats.subscribe();
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|state| state.data.is_some()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    // Two 503s were absorbed by the retry executor; the cycle never failed.
    assert!(state.error.is_none());
    assert_eq!(state.data.unwrap().total_trades, 3);
}

#[tokio::test]
async fn test_push_streams_poll_while_channel_down() {
    let base_url = spawn(backend(0)).await;
    let mut config = poll_only_config(&base_url);
    config.channel.url = "ws://127.0.0.1:9".to_string();

    let app = Application::new(config).unwrap();
    let channel = app.channel().unwrap().clone();
    assert_eq!(app.registry().len(), 1);
    assert_eq!(channel.state(), ChannelState::Disconnected);

    let streams = app.start_streams().unwrap();
    assert!(streams.bot_status.is_polling());
    assert!(streams.prices["0xaaa"].is_polling());
    assert!(channel.is_subscribed("0xaaa"));
    assert!(channel.is_subscribed("0xbbb"));

    let snapshot = streams.snapshot();
    let channel_view = snapshot.channel.unwrap();
    assert_eq!(channel_view.state, ChannelState::Disconnected);
    assert_eq!(channel_view.subscriptions.len(), 2);

    streams.close();
    assert!(!streams.bot_status.is_polling());
    assert!(!channel.is_subscribed("0xaaa"));
    assert!(channel.subscriptions().is_empty());
}
