// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The coordinator talks to an `ExecutorBackend` instead of a concrete
//! [`ProcessExecutor`]. Production code uses [`ProcessBackend`]; tests swap
//! in a fake that emits scripted lines without spawning anything.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::config::ExecutorConfig;
use crate::engine::{CancellationWatch, TaskRequest};
use crate::exec::executor::ProcessExecutor;
use crate::exec::result::ExecutionResult;
use crate::logs::LogSink;

/// Runs one task to completion.
///
/// Implementations must:
/// - publish output lines through `sink` as they are produced;
/// - stop promptly once `cancel` reports a stop request;
/// - report every failure inside the returned [`ExecutionResult`].
pub trait ExecutorBackend: Send + Sync {
    fn execute(
        &self,
        request: TaskRequest,
        sink: LogSink,
        cancel: CancellationWatch,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + '_>>;
}

/// Real backend: one fresh [`ProcessExecutor`] per task.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    config: ExecutorConfig,
}

impl ProcessBackend {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }
}

impl ExecutorBackend for ProcessBackend {
    fn execute(
        &self,
        request: TaskRequest,
        sink: LogSink,
        cancel: CancellationWatch,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + '_>> {
        let executor = ProcessExecutor::new(self.config.clone()).with_sink(sink);

        Box::pin(async move {
            debug!(
                generation = cancel.generation(),
                script = %request.script_path.display(),
                "dispatching task to process executor"
            );
            executor.execute(&request.script_path, cancel).await
        })
    }
}
