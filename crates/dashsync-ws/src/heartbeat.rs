//! Heartbeat tracking for the push channel.
//!
//! A ping is sent after `interval` of inbound silence. If the matching pong
//! does not arrive within `timeout`, the connection is treated as lost.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct HeartbeatInner {
    last_ping: Option<Instant>,
    last_activity: Instant,
    awaiting_pong: bool,
}

/// Heartbeat state for one connection at a time.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    inner: Mutex<HeartbeatInner>,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            inner: Mutex::new(HeartbeatInner {
                last_ping: None,
                last_activity: Instant::now(),
                awaiting_pong: false,
            }),
        }
    }

    /// Reset on a fresh connection.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.last_ping = None;
        inner.last_activity = Instant::now();
        inner.awaiting_pong = false;
    }

    /// Any inbound frame counts as activity.
    pub fn record_activity(&self) {
        self.inner.lock().last_activity = Instant::now();
    }

    pub fn record_ping(&self) {
        let mut inner = self.inner.lock();
        inner.last_ping = Some(Instant::now());
        inner.awaiting_pong = true;
    }

    /// Returns the round-trip time if a ping was outstanding.
    pub fn record_pong(&self) -> Option<Duration> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.last_activity = now;

        if !inner.awaiting_pong {
            return None;
        }
        inner.awaiting_pong = false;

        let rtt = inner.last_ping.map(|sent| now.duration_since(sent));
        if let Some(rtt) = rtt {
            debug!(rtt_ms = rtt.as_millis() as u64, "Received pong");
        }
        rtt
    }

    pub fn is_timed_out(&self) -> bool {
        let inner = self.inner.lock();
        match (inner.awaiting_pong, inner.last_ping) {
            (true, Some(sent)) => sent.elapsed() > self.timeout,
            _ => false,
        }
    }

    pub fn should_ping(&self) -> bool {
        let inner = self.inner.lock();
        !inner.awaiting_pong && inner.last_activity.elapsed() >= self.interval
    }

    /// How long the message loop may idle before checking again.
    pub fn check_period(&self) -> Duration {
        (self.interval / 2).min(self.timeout).max(Duration::from_millis(10))
    }
}
