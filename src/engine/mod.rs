// src/engine/mod.rs

//! Task orchestration.
//!
//! - [`cancel`] holds the generation-scoped cancellation signal.
//! - [`coordinator`] enforces the single-active-task rule and sequences
//!   start and stop across the executor and the log streamer.

use std::path::{Path, PathBuf};

pub mod cancel;
pub mod coordinator;

pub use cancel::{CancelReason, CancellationSignal, CancellationWatch};
pub use coordinator::{StartedTask, StopOutcome, TaskCoordinator};

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    /// Fully materialised script to execute.
    pub script_path: PathBuf,
    /// Human-readable goal shown in banners and checkpoints.
    pub label: Option<String>,
    /// Only echoed back in the success footer; never read.
    pub output_dir: Option<PathBuf>,
}

impl TaskRequest {
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            label: None,
            output_dir: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// The explicit label, or the script's file stem.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => label_from_path(&self.script_path),
        }
    }
}

fn label_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
