// src/logs/channel.rs

//! Producer side of the log pipeline.
//!
//! A [`LogSink`] is a cheap, clonable handle around an unbounded channel:
//! `publish` never blocks and can be called from any thread or task. The
//! single consumer is a [`crate::logs::LogStreamer`].

use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::StreamOrigin;

/// One timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub text: String,
    pub origin: StreamOrigin,
}

impl LogRecord {
    pub fn new(origin: StreamOrigin, text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            text: text.into(),
            origin,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp.format("%H:%M:%S");
        match self.origin {
            StreamOrigin::System => write!(f, "[{ts}] {}", self.text),
            origin => write!(f, "[{ts}][{origin}] {}", self.text),
        }
    }
}

/// Clonable producer handle for a task's log channel.
///
/// The streamer treats "every sink has been dropped" as "the producing unit
/// of work has finished", so only the execution unit should hold sinks.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl LogSink {
    /// Publish a coordinator/system line.
    pub fn publish(&self, text: impl Into<String>) {
        self.publish_from(StreamOrigin::System, text);
    }

    /// Publish a line read from one of the child's streams.
    pub fn publish_from(&self, origin: StreamOrigin, text: impl Into<String>) {
        let record = LogRecord::new(origin, text);
        if self.tx.send(record).is_err() {
            trace!("log consumer dropped; discarding record");
        }
    }

    /// Whether the consuming side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a fresh log channel.
pub fn log_channel() -> (LogSink, mpsc::UnboundedReceiver<LogRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LogSink { tx }, rx)
}
