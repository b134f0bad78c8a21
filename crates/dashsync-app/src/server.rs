//! Snapshot HTTP server using axum.

use crate::app::{Snapshot, Streams};
use crate::error::AppResult;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use dashsync_telemetry::Metrics;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct ServerState {
    streams: Arc<Streams>,
}

impl ServerState {
    pub fn new(streams: Arc<Streams>) -> Self {
        Self { streams }
    }
}

/// Create the axum router.
pub fn create_router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/metrics", get(get_metrics))
        .route("/health", get(get_health))
        .layer(cors)
        .with_state(state)
}

/// Current state of every stream as JSON.
async fn get_snapshot(State(state): State<ServerState>) -> Json<Snapshot> {
    Json(state.streams.snapshot())
}

/// Prometheus text exposition.
async fn get_metrics() -> Response {
    match Metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_health(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let snapshot = state.streams.snapshot();
    Json(json!({
        "status": "ok",
        "channel": snapshot.channel.map(|channel| channel.state),
    }))
}

/// Serve on an already bound listener until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: ServerState,
    shutdown: CancellationToken,
) -> AppResult<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Run the snapshot server on `port`.
pub async fn run_server(
    state: ServerState,
    port: u16,
    shutdown: CancellationToken,
) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting snapshot server");

    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await?;

    info!("Snapshot server stopped");
    Ok(())
}
