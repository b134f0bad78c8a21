//! Prometheus metrics for dashsync.
//!
//! Covers:
//! - Push channel state and reconnects
//! - Push events received per kind
//! - Retry attempts per error class
//! - Poll cycle outcomes and latency
//! - Live stream merge decisions
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error surfaced on first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_histogram_vec, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramVec,
    TextEncoder,
};

/// Push channel connection state (1 = connected, 0 = otherwise).
pub static CHANNEL_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "dashsync_channel_connected",
        "Push channel connection state (1=connected)"
    )
    .unwrap()
});

/// Push channel state machine current state.
/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static CHANNEL_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "dashsync_channel_state",
        "Push channel state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static CHANNEL_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dashsync_channel_reconnect_total",
        "Total push channel reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Heartbeat round-trip time in milliseconds.
pub static CHANNEL_HEARTBEAT_RTT_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "dashsync_channel_heartbeat_rtt_ms",
        "Ping to pong round-trip time in milliseconds",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Push events dispatched to listeners.
pub static PUSH_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dashsync_push_events_total",
        "Total push events received",
        &["kind"]
    )
    .unwrap()
});

/// Retries scheduled by the retry executor.
pub static RETRY_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dashsync_retry_total",
        "Total retries scheduled after a failed attempt",
        &["error"]
    )
    .unwrap()
});

/// Poll cycle outcomes.
/// Labels: poller, outcome (success/error/skipped/discarded)
pub static POLL_OUTCOME_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dashsync_poll_outcome_total",
        "Total poll cycles by outcome",
        &["poller", "outcome"]
    )
    .unwrap()
});

/// Poll fetch latency in milliseconds.
pub static POLL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "dashsync_poll_latency_ms",
        "Poll fetch latency in milliseconds",
        &["poller"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]
    )
    .unwrap()
});

/// Live stream merge decisions.
/// Labels: source (push/poll), result (applied/dropped)
pub static LIVE_MERGE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "dashsync_live_merge_total",
        "Live stream updates by source and merge result",
        &["source", "result"]
    )
    .unwrap()
});

const CHANNEL_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "reconnecting"];

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set push channel state. Only the active state is set to 1.
    pub fn channel_state_set(state: &str) {
        for s in CHANNEL_STATES {
            CHANNEL_STATE.with_label_values(&[s]).set(0.0);
        }
        CHANNEL_STATE.with_label_values(&[state]).set(1.0);
        CHANNEL_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn channel_reconnect(reason: &str) {
        CHANNEL_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn heartbeat_rtt(rtt_ms: f64) {
        CHANNEL_HEARTBEAT_RTT_MS.observe(rtt_ms);
    }

    pub fn push_event(kind: &str) {
        PUSH_EVENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn retry(error: &str) {
        RETRY_TOTAL.with_label_values(&[error]).inc();
    }

    pub fn poll_outcome(poller: &str, outcome: &str) {
        POLL_OUTCOME_TOTAL
            .with_label_values(&[poller, outcome])
            .inc();
    }

    pub fn poll_latency(poller: &str, latency_ms: f64) {
        POLL_LATENCY_MS
            .with_label_values(&[poller])
            .observe(latency_ms);
    }

    pub fn live_merge(source: &str, applied: bool) {
        let result = if applied { "applied" } else { "dropped" };
        LIVE_MERGE_TOTAL.with_label_values(&[source, result]).inc();
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_is_exclusive() {
        Metrics::channel_state_set("reconnecting");
        Metrics::channel_state_set("connected");

        assert_eq!(CHANNEL_STATE.with_label_values(&["connected"]).get(), 1.0);
        assert_eq!(CHANNEL_STATE.with_label_values(&["reconnecting"]).get(), 0.0);
        assert_eq!(CHANNEL_CONNECTED.get(), 1.0);
    }

    #[test]
    fn test_gather_text_contains_counters() {
        Metrics::poll_outcome("bot_status", "success");
        Metrics::retry("server");

        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("dashsync_poll_outcome_total"));
        assert!(text.contains("dashsync_retry_total"));
    }
}
