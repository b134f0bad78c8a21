//! Merge rule for push and poll updates.
//!
//! A candidate is applied only if it is newer than `last_updated`. On an
//! exact tie the push update wins. A successful update from either source
//! clears `error`; a poll failure sets it and keeps `data`.

use chrono::{DateTime, Utc};
use dashsync_core::{PollState, SyncError};
use dashsync_telemetry::Metrics;
use std::fmt;

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Push,
    Poll,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `data` observed at `at` if it wins. Returns whether it was applied.
pub fn apply_update<T>(
    state: &mut PollState<T>,
    source: UpdateSource,
    data: T,
    at: DateTime<Utc>,
) -> bool {
    let wins = match (state.last_updated, source) {
        (None, _) => true,
        (Some(last), UpdateSource::Push) => at >= last,
        (Some(last), UpdateSource::Poll) => at > last,
    };

    Metrics::live_merge(source.as_str(), wins);
    if !wins {
        return false;
    }

    state.data = Some(data);
    state.error = None;
    state.last_updated = Some(at);
    true
}

/// Record a failed refresh without dropping the last good value.
pub fn apply_error<T>(state: &mut PollState<T>, error: SyncError) {
    state.error = Some(error);
}
