// src/logs/mod.rs

//! Log transport between a running task and a polling observer.
//!
//! - [`channel`] is the producer side (`LogSink`, `LogRecord`).
//! - [`streamer`] drains the channel into a rolling buffer and paces
//!   snapshots (debounce + heartbeat).
//! - [`snapshot`] is the rendered, immutable view handed to observers.
//! - [`checkpoint`] persists lightweight progress records for external
//!   staleness detection.

pub mod channel;
pub mod checkpoint;
pub mod snapshot;
pub mod streamer;

pub use channel::{log_channel, LogRecord, LogSink};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use snapshot::{format_elapsed, LogSnapshot, SnapshotKind};
pub use streamer::LogStreamer;
