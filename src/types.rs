use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the single task slot owned by the coordinator.
///
/// - `Running` / `Cancelling` are the only *active* states; at most one task
///   can be in either of them at a time.
/// - `Completed`, `Failed` and `Cancelled` are terminal and describe the most
///   recent task once its execution unit has torn itself down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Idle,
    Running,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Cancelling)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Idle
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Cancelling => "cancelling",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one spawned script process.
///
/// `Idle → Spawned → Running → {Exited(code) | Terminating → Killed | Terminating → Exited(code)}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessLifecycle {
    Spawned,
    Running,
    Terminating,
    Exited(i32),
    Killed,
}

impl ProcessLifecycle {
    /// Whether the process can still receive a termination request.
    pub fn is_live(self) -> bool {
        matches!(self, ProcessLifecycle::Spawned | ProcessLifecycle::Running)
    }
}

/// Where a log line came from.
///
/// `System` marks banners written by the coordinator itself rather than read
/// from the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamOrigin {
    Stdout,
    Stderr,
    System,
}

impl fmt::Display for StreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOrigin::Stdout => f.write_str("stdout"),
            StreamOrigin::Stderr => f.write_str("stderr"),
            StreamOrigin::System => f.write_str("system"),
        }
    }
}
