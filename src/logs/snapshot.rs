// src/logs/snapshot.rs

use std::fmt;
use std::time::Duration;

use crate::logs::channel::LogRecord;
use crate::types::TaskState;

/// Why a snapshot was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// New records arrived and the debounce interval had elapsed.
    Update,
    /// Nothing new for a full heartbeat interval; proves liveness.
    Heartbeat,
    /// Last snapshot of the sequence.
    Final,
}

/// Immutable, rendered view of the log tail at one instant.
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    /// Most recent records, oldest first.
    pub lines: Vec<LogRecord>,
    /// Lines seen so far that are not part of `lines`.
    pub truncated_count: u64,
    pub total_lines_seen: u64,
    pub elapsed: Duration,
    /// `Running` while the task is alive, the terminal state in the final
    /// snapshot.
    pub state: TaskState,
    pub kind: SnapshotKind,
}

impl LogSnapshot {
    pub fn is_final(&self) -> bool {
        self.kind == SnapshotKind::Final
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    /// Texts of the visible lines, without timestamps.
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|r| r.text.as_str()).collect()
    }

    fn final_banner(&self) -> Option<String> {
        if !self.is_final() {
            return None;
        }
        let banner = match self.state {
            TaskState::Cancelled => "Task stopped by user".to_string(),
            TaskState::Failed => format!(
                "Task failed after {} log lines",
                self.total_lines_seen
            ),
            _ => format!(
                "Task completed: {} log lines processed",
                self.total_lines_seen
            ),
        };
        Some(banner)
    }
}

/// Format an elapsed duration as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

impl fmt::Display for LogSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.truncated_count > 0 {
            writeln!(f, "[...{} earlier lines hidden...]", self.truncated_count)?;
            writeln!(f)?;
        }

        for line in &self.lines {
            writeln!(f, "{line}")?;
        }

        if let Some(banner) = self.final_banner() {
            writeln!(f)?;
            writeln!(f, "{banner}")?;
        }

        writeln!(f)?;
        writeln!(f, "{}", "=".repeat(50))?;
        write!(
            f,
            "Lines: {} | Showing: {} | Elapsed: {} | Status: {}",
            self.total_lines_seen,
            self.lines.len(),
            format_elapsed(self.elapsed),
            self.state
        )
    }
}
