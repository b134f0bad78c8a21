//! Live data for dashsync consumers.
//!
//! - `PollingController`: interval fetches with an in-flight guard and
//!   generation-checked commits, so nothing lands after `stop()`
//! - `merge`: the timestamp rule that combines push and poll updates
//! - `LiveDataFacade`: one merged stream per data source, push-first with
//!   polling as the initial value and the fallback while disconnected

pub mod facade;
pub mod merge;
pub mod poll;

pub use facade::{LiveDataFacade, LiveStream, PushSource};
pub use merge::{apply_error, apply_update, UpdateSource};
pub use poll::{CycleHook, PollCycle, PollOptions, PollingController};
