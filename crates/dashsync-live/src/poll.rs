//! Interval polling with lifecycle-safe cancellation.
//!
//! A controller owns one `PollState<T>` and is its only writer. Cycles never
//! overlap: a tick that arrives while a fetch is outstanding is skipped.
//! Every commit is checked against a generation counter that `stop()`
//! bumps, so a fetch resolving after `stop()` is discarded.

use chrono::{DateTime, Utc};
use dashsync_core::{PollState, SyncError, SyncResult};
use dashsync_telemetry::Metrics;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(30_000);

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<T>> + Send + Sync>;

/// Progress of one fetch cycle, reported to a `CycleHook`.
#[derive(Debug)]
pub enum PollCycle<'a, T> {
    Started,
    /// `at` is when the request was issued, not when it resolved.
    Succeeded { data: &'a T, at: DateTime<Utc> },
    Failed(&'a SyncError),
}

/// Called for every committed cycle step, in commit order.
pub type CycleHook<T> = Arc<dyn Fn(PollCycle<'_, T>) + Send + Sync>;

/// Polling options.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Must be non-zero.
    pub interval: Duration,
    pub enabled: bool,
    /// Label for logs and metrics.
    pub name: String,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            enabled: true,
            name: "poll".to_string(),
        }
    }
}

impl PollOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn validate(&self) -> SyncResult<()> {
        if self.interval.is_zero() {
            return Err(SyncError::Validation(format!(
                "poll interval for {} must be greater than zero",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Started,
    Finished,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct PollInner<T> {
    name: String,
    interval: Duration,
    fetch: FetchFn<T>,
    hook: Option<CycleHook<T>>,
    state: watch::Sender<PollState<T>>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    stopped: AtomicBool,
    enabled: AtomicBool,
    timer: Mutex<Option<CancellationToken>>,
}

impl<T: Clone + Send + Sync + 'static> PollInner<T> {
    /// Run one cycle. Returns `false` if it was skipped.
    async fn run_cycle(&self) -> bool {
        // Generation is read before the stopped flag; stop() writes them in
        // the opposite order.
        let generation = self.generation.load(Ordering::SeqCst);
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(poller = %self.name, "Fetch in flight, skipping cycle");
            Metrics::poll_outcome(&self.name, "skipped");
            return false;
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.commit(generation, |state| {
            state.loading = true;
            Step::Started
        });

        // Stamped when the request goes out: a push received while the fetch
        // is outstanding is newer than anything the fetch can return.
        let requested_at = Utc::now();
        let started = Instant::now();
        let result = (self.fetch)().await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        Metrics::poll_latency(&self.name, latency_ms);

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => {
                warn!(poller = %self.name, error = %e, "Poll fetch failed");
                "error"
            }
        };

        let committed = self.commit(generation, |state| {
            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    state.last_updated = Some(requested_at);
                }
                Err(error) => state.error = Some(error),
            }
            Step::Finished
        });

        if committed {
            Metrics::poll_outcome(&self.name, outcome);
        } else {
            debug!(poller = %self.name, "Discarding fetch result after stop");
            Metrics::poll_outcome(&self.name, "discarded");
        }
        true
    }

    /// Apply `mutate` unless the generation moved on.
    ///
    /// The hook sees the committed state under the same lock, so hook calls
    /// are ordered with commits and none happen after `stop()` returns.
    fn commit<F>(&self, generation: u64, mutate: F) -> bool
    where
        F: FnOnce(&mut PollState<T>) -> Step,
    {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            let step = mutate(state);
            if let Some(hook) = &self.hook {
                match step {
                    Step::Started => hook(PollCycle::Started),
                    Step::Finished => match (&state.error, &state.data, state.last_updated) {
                        (Some(error), _, _) => hook(PollCycle::Failed(error)),
                        (None, Some(data), Some(at)) => hook(PollCycle::Succeeded { data, at }),
                        _ => {}
                    },
                }
            }
            true
        })
    }
}

impl<T> PollInner<T> {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_timer();
        self.state.send_if_modified(|state| {
            let was_loading = state.loading;
            state.loading = false;
            was_loading
        });
        info!(poller = %self.name, "Polling stopped");
    }

    fn cancel_timer(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }
}

fn start_timer<T: Clone + Send + Sync + 'static>(inner: &Arc<PollInner<T>>) {
    let token = {
        let mut timer = inner.timer.lock();
        if timer.is_some() || inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let token = CancellationToken::new();
        *timer = Some(token.clone());
        token
    };

    let weak: Weak<PollInner<T>> = Arc::downgrade(inner);
    let interval = inner.interval;
    debug!(poller = %inner.name, interval_ms = interval.as_millis() as u64, "Polling timer started");

    tokio::spawn(async move {
        // First tick completes immediately.
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    // Cycles run beside the ticker so an overlapping tick is
                    // observed and skipped rather than delayed.
                    tokio::spawn(async move {
                        inner.run_cycle().await;
                    });
                }
            }
        }
    });
}

/// Interval polling controller.
///
/// Dropping the controller stops it.
pub struct PollingController<T> {
    inner: Arc<PollInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> PollingController<T> {
    /// Start polling `fetch`.
    ///
    /// When `options.enabled`, the first fetch runs immediately and then
    /// every `options.interval`. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `SyncError::Validation` if the interval is zero.
    pub fn start<F, Fut>(fetch: F, options: PollOptions) -> SyncResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        Self::start_with_hook(fetch, options, None)
    }

    /// Like `start`, reporting every committed cycle step to `hook`.
    pub fn start_with_hook<F, Fut>(
        fetch: F,
        options: PollOptions,
        hook: Option<CycleHook<T>>,
    ) -> SyncResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<T>> + Send + 'static,
    {
        options.validate()?;

        let fetch: FetchFn<T> = Arc::new(move || fetch().boxed());
        let (state, _) = watch::channel(PollState::default());

        let inner = Arc::new(PollInner {
            name: options.name,
            interval: options.interval,
            fetch,
            hook,
            state,
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            enabled: AtomicBool::new(options.enabled),
            timer: Mutex::new(None),
        });

        if options.enabled {
            start_timer(&inner);
        }
        Ok(Self { inner })
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> PollState<T> {
        self.inner.state.borrow().clone()
    }

    /// Run one cycle now, regardless of `enabled`.
    ///
    /// Returns `false` if a cycle was already in flight or the controller
    /// is stopped.
    pub async fn refetch(&self) -> bool {
        self.inner.run_cycle().await
    }

    /// Resume or pause scheduling. Resuming fetches immediately.
    pub fn set_enabled(&self, enabled: bool) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }

        debug!(poller = %self.inner.name, enabled, "Polling toggled");
        if enabled {
            start_timer(&self.inner);
        } else {
            self.inner.cancel_timer();
        }
    }
}

impl<T> PollingController<T> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Cancel the timer and discard any in-flight result. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl<T> Drop for PollingController<T> {
    fn drop(&mut self) {
        self.inner.stop();
    }
}
