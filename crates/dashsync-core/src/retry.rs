//! Retry with exponential backoff.
//!
//! The executor runs an async operation up to `max_attempts` times. Delays
//! are deterministic: `min(max_delay, initial_delay * multiplier^(attempt-1))`
//! with no jitter. Per-attempt timeouts are the operation's responsibility.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default floor applied to the delay after a `RateLimited` failure.
const DEFAULT_RATE_LIMIT_FLOOR: Duration = Duration::from_millis(5000);

/// Immutable retry policy supplied per call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
}

/// Unvalidated policy as it appears in configuration files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawRetryPolicy {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = SyncError;

    fn try_from(raw: RawRetryPolicy) -> SyncResult<Self> {
        Self::new(
            raw.max_attempts,
            raw.initial_delay_ms,
            raw.max_delay_ms,
            raw.backoff_multiplier,
        )
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay_ms,
            max_delay_ms: policy.max_delay_ms,
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Create a validated policy.
    ///
    /// # Errors
    /// `SyncError::Validation` if `max_attempts < 1`,
    /// `max_delay_ms < initial_delay_ms` or `backoff_multiplier <= 1`.
    pub fn new(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
    ) -> SyncResult<Self> {
        if max_attempts < 1 {
            return Err(SyncError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if max_delay_ms < initial_delay_ms {
            return Err(SyncError::Validation(format!(
                "max_delay_ms ({max_delay_ms}) must be >= initial_delay_ms ({initial_delay_ms})"
            )));
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier <= 1.0 {
            return Err(SyncError::Validation(format!(
                "backoff_multiplier must be > 1, got {backoff_multiplier}"
            )));
        }

        Ok(Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Delay after a failure of `attempt` (1-based).
    ///
    /// attempt=1 -> initial, attempt=2 -> initial * m, ... capped at max.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay sequence for attempts `1..=max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(|attempt| self.delay_for_attempt(attempt))
    }
}

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    Success(T),
    Failure { error: SyncError, attempt: u32 },
}

/// Callback invoked before each backoff sleep with `(attempt, error, delay)`.
pub type RetryObserver = Arc<dyn Fn(u32, &SyncError, Duration) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryMode {
    /// Retry every failure until attempts run out.
    All,
    /// Re-raise non-retryable failures immediately.
    TransientOnly,
}

/// Executes async operations with bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    observer: Option<RetryObserver>,
    rate_limit_floor: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("has_observer", &self.observer.is_some())
            .field("rate_limit_floor", &self.rate_limit_floor)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self {
            observer: None,
            rate_limit_floor: DEFAULT_RATE_LIMIT_FLOOR,
        }
    }

    /// Attach a retry observer (logging, metrics).
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Minimum delay after a `RateLimited` failure.
    pub fn with_rate_limit_floor(mut self, floor: Duration) -> Self {
        self.rate_limit_floor = floor;
        self
    }

    /// Run `operation`, retrying every failure.
    ///
    /// # Errors
    /// `SyncError::RetryExhausted` wrapping the last failure once
    /// `policy.max_attempts()` attempts have failed.
    pub async fn execute<T, F, Fut>(&self, operation: F, policy: &RetryPolicy) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        self.run(operation, policy, RetryMode::All).await
    }

    /// Run `operation`, retrying only transient failures.
    ///
    /// A non-retryable failure is returned as-is on the attempt it occurs.
    pub async fn execute_transient_only<T, F, Fut>(
        &self,
        operation: F,
        policy: &RetryPolicy,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        self.run(operation, policy, RetryMode::TransientOnly).await
    }

    /// Run `operation` like `execute`, returning `fallback` on exhaustion.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        operation: F,
        fallback: T,
        policy: &RetryPolicy,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        match self.execute(operation, policy).await {
            Err(SyncError::RetryExhausted { attempts, last }) => {
                warn!(attempts, error = %last, "Retries exhausted, using fallback value");
                Ok(fallback)
            }
            other => other,
        }
    }

    async fn run<T, F, Fut>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
        mode: RetryMode,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 1u32;

        loop {
            let outcome = match operation().await {
                Ok(value) => AttemptOutcome::Success(value),
                Err(error) => AttemptOutcome::Failure { error, attempt },
            };

            let error = match outcome {
                AttemptOutcome::Success(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                AttemptOutcome::Failure { error, .. } => error,
            };

            if mode == RetryMode::TransientOnly && !error.is_retryable() {
                debug!(attempt, %error, "Non-retryable failure, not retrying");
                return Err(error);
            }

            if attempt >= policy.max_attempts() {
                warn!(attempt, %error, "Retry attempts exhausted");
                return Err(SyncError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = self.delay_for(policy, attempt, &error);
            warn!(
                attempt,
                max_attempts = policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                %error,
                "Operation failed, retrying"
            );
            if let Some(observer) = &self.observer {
                observer(attempt, &error, delay);
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn delay_for(&self, policy: &RetryPolicy, attempt: u32, error: &SyncError) -> Duration {
        let delay = policy.delay_for_attempt(attempt);
        match error {
            SyncError::RateLimited { retry_after_ms } => {
                let hint = retry_after_ms.map(Duration::from_millis).unwrap_or_default();
                delay.max(self.rate_limit_floor).max(hint)
            }
            _ => delay,
        }
    }
}
