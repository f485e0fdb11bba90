// src/engine/coordinator.rs

//! Single-active-task coordinator.
//!
//! Each mutable piece of task state has one writer per phase:
//!
//! - `start_task` is the only writer of the active slot at start time;
//! - `request_stop` only ever flips the one-way cancellation flag;
//! - the worker's own completion path is the only place that clears the slot
//!   and records the terminal state.
//!
//! The slot lock is held for short, non-async sections only.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigFile, StreamConfig};
use crate::engine::{CancellationSignal, CancellationWatch, TaskRequest};
use crate::errors::{Result, TaskstreamError};
use crate::exec::{ExecutionOutcome, ExecutionResult, ExecutorBackend, ProcessBackend};
use crate::fs::{FileSystem, RealFileSystem};
use crate::logs::checkpoint::format_wall_time;
use crate::logs::{log_channel, Checkpoint, CheckpointStore, LogSink, LogStreamer};
use crate::types::TaskState;

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No task was active; nothing changed.
    NothingToStop,
    /// The flag was set for the active task.
    Requested,
    /// The flag was already set for the active task.
    AlreadyRequested,
}

/// Handles returned to the caller of [`TaskCoordinator::start_task`].
#[derive(Debug)]
pub struct StartedTask {
    pub generation: u64,
    pub started_at: DateTime<Local>,
    /// Snapshot source for this task only.
    pub logs: LogStreamer,
    /// Resolves with the execution result once the worker finishes.
    pub result: oneshot::Receiver<ExecutionResult>,
}

#[derive(Debug)]
struct ActiveTask {
    generation: u64,
    script_path: PathBuf,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Shared {
    active: Mutex<Option<ActiveTask>>,
    last_state: Mutex<TaskState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    /// Clear the slot if it still belongs to `generation`.
    fn teardown(&self, generation: u64, state: TaskState) {
        *lock(&self.last_state) = state;

        let mut active = lock(&self.active);
        match active.as_ref() {
            Some(task) if task.generation == generation => {
                debug!(
                    generation,
                    script = %task.script_path.display(),
                    %state,
                    "tearing down active task"
                );
                *active = None;
            }
            _ => warn!(generation, "active slot no longer owned by finishing task"),
        }
    }
}

/// Owns the cancellation signal and the active-task slot.
///
/// `start_task` must be called from within a tokio runtime: the execution
/// unit is spawned onto it.
pub struct TaskCoordinator {
    backend: Arc<dyn ExecutorBackend>,
    fs: Arc<dyn FileSystem>,
    stream: StreamConfig,
    signal: CancellationSignal,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TaskCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCoordinator")
            .field("generation", &self.signal.generation())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TaskCoordinator {
    pub fn new(
        backend: Arc<dyn ExecutorBackend>,
        fs: Arc<dyn FileSystem>,
        stream: StreamConfig,
    ) -> Self {
        Self {
            backend,
            fs,
            stream,
            signal: CancellationSignal::new(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Production wiring: real processes, real checkpoint file.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(
            Arc::new(ProcessBackend::new(cfg.executor.clone())),
            Arc::new(RealFileSystem),
            cfg.stream.clone(),
        )
    }

    /// Start `request` as the single active task.
    pub fn start_task(&self, request: TaskRequest) -> Result<StartedTask> {
        if !self.fs.exists(&request.script_path) {
            return Err(TaskstreamError::ScriptNotFound(request.script_path));
        }

        let mut active = lock(&self.shared.active);
        if let Some(task) = active.as_ref() {
            if !task.handle.is_finished() {
                info!(generation = task.generation, "rejecting start: a task is already running");
                return Err(TaskstreamError::AlreadyRunning {
                    generation: task.generation,
                });
            }
            warn!(
                generation = task.generation,
                "previous execution unit ended without teardown; discarding its slot"
            );
            *active = None;
        }

        let generation = self.signal.advance();
        let started_at = Local::now();
        let label = request.display_label();

        let (sink, rx) = log_channel();
        let (state_tx, state_rx) = watch::channel(TaskState::Running);
        let (result_tx, result_rx) = oneshot::channel();

        let store = CheckpointStore::new(Arc::clone(&self.fs), &self.stream.checkpoint_path);
        store.save_or_warn(&Checkpoint {
            running: true,
            label: label.clone(),
            start_time: format_wall_time(started_at),
            line_count: 0,
            last_update: format_wall_time(started_at),
            state: None,
        });

        let logs = LogStreamer::new(rx, state_rx, self.stream.clone())
            .with_label(label.clone(), started_at)
            .with_checkpoints(store)
            .with_cancellation(self.signal.watch(generation));

        let worker = Worker {
            generation,
            label,
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            cancel: self.signal.watch(generation),
            state_tx,
            result_tx,
        };
        let script_path = request.script_path.clone();
        let handle = tokio::spawn(worker.run(request, sink));

        info!(generation, script = %script_path.display(), "task started");
        *active = Some(ActiveTask {
            generation,
            script_path,
            handle,
        });

        Ok(StartedTask {
            generation,
            started_at,
            logs,
            result: result_rx,
        })
    }

    /// Ask the active task to stop. Never waits for the process to exit.
    pub fn request_stop(&self) -> StopOutcome {
        let active = lock(&self.shared.active);
        match active.as_ref() {
            Some(task) if !task.handle.is_finished() => {
                if self.signal.cancel(task.generation) {
                    info!(generation = task.generation, "stop requested");
                    StopOutcome::Requested
                } else {
                    debug!(generation = task.generation, "stop already requested");
                    StopOutcome::AlreadyRequested
                }
            }
            _ => {
                info!("nothing to stop");
                StopOutcome::NothingToStop
            }
        }
    }

    /// True iff an execution unit is stored and has not finished.
    pub fn is_running(&self) -> bool {
        lock(&self.shared.active)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// `Running`/`Cancelling` while active, `Failed` if the execution unit
    /// ended without tearing down, otherwise the last terminal state (`Idle`
    /// before the first task).
    pub fn state(&self) -> TaskState {
        let active = lock(&self.shared.active);
        match active.as_ref() {
            Some(task) if !task.handle.is_finished() => {
                if self.signal.is_cancelled(task.generation) {
                    TaskState::Cancelling
                } else {
                    TaskState::Running
                }
            }
            // The execution unit died before its teardown ran.
            Some(_) => TaskState::Failed,
            None => *lock(&self.shared.last_state),
        }
    }

    pub fn generation(&self) -> u64 {
        self.signal.generation()
    }
}

/// The execution unit: one per started task.
struct Worker {
    generation: u64,
    label: String,
    backend: Arc<dyn ExecutorBackend>,
    shared: Arc<Shared>,
    cancel: CancellationWatch,
    state_tx: watch::Sender<TaskState>,
    result_tx: oneshot::Sender<ExecutionResult>,
}

impl Worker {
    async fn run(self, request: TaskRequest, sink: LogSink) {
        let generation = self.generation;
        sink.publish(format!("Starting task: {}", self.label));
        sink.publish(format!("Script: {}", request.script_path.display()));

        let output_dir = request.output_dir.clone();
        let result = self
            .backend
            .execute(request, sink.clone(), self.cancel.clone())
            .await;

        let state = result.task_state(self.cancel.is_cancelled());
        publish_outcome(&sink, &result, state, output_dir.as_ref());
        info!(generation, %state, exit_code = ?result.exit_code(), "task finished");

        // Terminal state goes out before the last sink is dropped so the
        // streamer's final snapshot sees it.
        self.state_tx.send_replace(state);
        self.shared.teardown(generation, state);

        if self.result_tx.send(result).is_err() {
            debug!(generation, "result receiver dropped");
        }
        sink.publish("Execution unit finished");
    }
}

fn publish_outcome(
    sink: &LogSink,
    result: &ExecutionResult,
    state: TaskState,
    output_dir: Option<&PathBuf>,
) {
    match (state, &result.outcome) {
        (TaskState::Completed, _) => {
            sink.publish("Task completed successfully");
            if let Some(dir) = output_dir {
                sink.publish(format!("Results saved in: {}", dir.display()));
            }
        }
        (TaskState::Cancelled, _) => sink.publish("Task interrupted by user"),
        (_, ExecutionOutcome::Failed { message }) => {
            sink.publish(format!("Execution error: {message}"));
        }
        (_, ExecutionOutcome::Completed { exit_code: Some(code) }) => {
            sink.publish(format!("Task failed with exit code {code}"));
        }
        (_, _) => sink.publish("Task terminated by signal"),
    }
}
