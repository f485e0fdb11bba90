// src/exec/result.rs

use std::collections::VecDeque;
use std::fmt;

use crate::types::TaskState;

/// Marker line placed in front of the output of an interrupted run.
pub const INTERRUPTED_MARKER: &str = "Process interrupted by user";

/// How one execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The process exited on its own. `exit_code` is `None` when it was
    /// killed by a signal nobody here sent.
    Completed { exit_code: Option<i32> },
    /// Cancellation was observed; output is partial.
    Interrupted,
    /// The script could not be prepared or spawned.
    Failed { message: String },
}

/// Bounded tail of a child's output: only the last `capacity` lines survive.
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    capacity: usize,
    lines: VecDeque<String>,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
}

impl ExecutionResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: ExecutionOutcome::Failed {
                message: message.into(),
            },
            stdout_tail: Vec::new(),
            stderr_tail: Vec::new(),
        }
    }

    pub fn interrupted(stdout_tail: Vec<String>, stderr_tail: Vec<String>) -> Self {
        Self {
            outcome: ExecutionOutcome::Interrupted,
            stdout_tail,
            stderr_tail,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.outcome == ExecutionOutcome::Interrupted
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ExecutionOutcome::Completed { exit_code } => exit_code,
            _ => None,
        }
    }

    /// Terminal task state for this result. A stop request that raced with a
    /// natural exit still counts as a cancellation.
    pub fn task_state(&self, cancel_requested: bool) -> TaskState {
        match &self.outcome {
            ExecutionOutcome::Interrupted => TaskState::Cancelled,
            _ if cancel_requested => TaskState::Cancelled,
            ExecutionOutcome::Completed { exit_code: Some(0) } => TaskState::Completed,
            ExecutionOutcome::Completed { .. } | ExecutionOutcome::Failed { .. } => {
                TaskState::Failed
            }
        }
    }

    /// Combined stdout + stderr tail, without any marker.
    pub fn combined_output(&self) -> String {
        let stdout = self
            .stdout_tail
            .iter()
            .map(|l| format!("[stdout] {l}"))
            .collect::<Vec<_>>()
            .join("\n");
        let stderr = self.stderr_tail.join("\n");

        [stdout, stderr]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text handed back to the caller.
    pub fn text(&self) -> String {
        match &self.outcome {
            ExecutionOutcome::Failed { message } => format!("Execution error: {message}"),
            ExecutionOutcome::Interrupted => {
                let output = self.combined_output();
                if output.is_empty() {
                    INTERRUPTED_MARKER.to_string()
                } else {
                    format!("{INTERRUPTED_MARKER}\n{output}")
                }
            }
            ExecutionOutcome::Completed { .. } => self.combined_output(),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
