// src/logs/checkpoint.rs

//! Durable progress record, independent of snapshot delivery.
//!
//! The checkpoint is a small JSON document overwritten in place (temp file +
//! rename) so an external watcher can tell a live task from a stalled or
//! crashed one without consuming the snapshot stream.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::TaskState;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a wall-clock time the way checkpoints store it.
pub fn format_wall_time(t: DateTime<Local>) -> String {
    t.format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub running: bool,
    pub label: String,
    pub start_time: String,
    pub line_count: u64,
    pub last_update: String,
    /// Terminal state once the task has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
}

impl Checkpoint {
    /// `last_update` parsed back into local time.
    pub fn last_update_time(&self) -> Option<DateTime<Local>> {
        let naive = NaiveDateTime::parse_from_str(&self.last_update, TIME_FORMAT).ok()?;
        Local.from_local_datetime(&naive).earliest()
    }

    /// A running checkpoint that has not been rewritten for `threshold` is
    /// stale. Finished checkpoints are never stale; unparsable ones always are.
    pub fn is_stale(&self, now: DateTime<Local>, threshold: Duration) -> bool {
        if !self.running {
            return false;
        }
        match self.last_update_time() {
            Some(updated) => (now - updated)
                .to_std()
                .map(|age| age > threshold)
                .unwrap_or(false),
            None => true,
        }
    }
}

/// Reads and atomically rewrites the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp = self.tmp_path();

        self.fs
            .write(&tmp, &json)
            .with_context(|| format!("writing checkpoint {:?}", tmp))?;
        self.fs
            .rename(&tmp, &self.path)
            .with_context(|| format!("replacing checkpoint {:?}", self.path))?;

        debug!(
            path = %self.path.display(),
            running = checkpoint.running,
            line_count = checkpoint.line_count,
            "checkpoint written"
        );
        Ok(())
    }

    /// Best-effort save: failures are logged and swallowed.
    pub fn save_or_warn(&self, checkpoint: &Checkpoint) {
        if let Err(e) = self.save(checkpoint) {
            warn!(path = %self.path.display(), error = %e, "failed to save checkpoint");
        }
    }

    /// Load the current checkpoint, `None` if none has been written yet.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.fs.exists(&self.path) {
            return Ok(None);
        }
        let raw = self.fs.read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
