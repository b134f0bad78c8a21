//! Observable state shared by pollers and the live facade.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest known value of a data stream.
///
/// `error` holds the most recent failure; `data` is kept across failures
/// so consumers do not lose the last good value on a blip.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    pub data: Option<T>,
    pub error: Option<SyncError>,
    pub loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            loading: false,
            last_updated: None,
        }
    }
}

impl<T> PollState<T> {
    /// True when data is present but the last refresh failed.
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// Serializable view used by snapshot endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStateView<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T: Clone> From<&PollState<T>> for PollStateView<T> {
    fn from(state: &PollState<T>) -> Self {
        Self {
            data: state.data.clone(),
            error: state.error.as_ref().map(ToString::to_string),
            loading: state.loading,
            last_updated: state.last_updated,
        }
    }
}
