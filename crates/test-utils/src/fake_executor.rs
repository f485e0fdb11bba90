use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskstream::engine::{CancelReason, CancellationWatch, TaskRequest};
use taskstream::exec::{ExecutionOutcome, ExecutionResult, ExecutorBackend, OutputTail};
use taskstream::logs::LogSink;
use taskstream::types::StreamOrigin;

/// A fake executor that:
/// - records every request it was handed
/// - publishes a scripted list of stdout lines, one per `line_interval`
/// - then holds for `hold` (or until cancelled) and exits with `exit_code`.
///
/// Cancellation is observed between lines and during the hold.
#[derive(Clone)]
pub struct FakeExecutor {
    lines: Vec<String>,
    line_interval: Duration,
    hold: Duration,
    exit_code: i32,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<TaskRequest>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            line_interval: Duration::ZERO,
            hold: Duration::ZERO,
            exit_code: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_line_interval(mut self, d: Duration) -> Self {
        self.line_interval = d;
        self
    }

    pub fn with_hold(mut self, d: Duration) -> Self {
        self.hold = d;
        self
    }

    /// Hold until a stop request arrives.
    pub fn until_cancelled(self) -> Self {
        self.with_hold(Duration::from_secs(24 * 60 * 60))
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TaskRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorBackend for FakeExecutor {
    fn execute(
        &self,
        request: TaskRequest,
        sink: LogSink,
        mut cancel: CancellationWatch,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        Box::pin(async move {
            let mut tail = OutputTail::new(10);

            for line in &self.lines {
                if !self.line_interval.is_zero() {
                    tokio::time::sleep(self.line_interval).await;
                }
                if cancel.is_cancelled() {
                    return ExecutionResult::interrupted(tail.into_lines(), Vec::new());
                }
                sink.publish_from(StreamOrigin::Stdout, line.as_str());
                tail.push(line.clone());
            }

            tokio::select! {
                reason = cancel.cancelled() => {
                    if reason == CancelReason::Requested {
                        return ExecutionResult::interrupted(tail.into_lines(), Vec::new());
                    }
                }
                _ = tokio::time::sleep(self.hold) => {}
            }

            ExecutionResult {
                outcome: ExecutionOutcome::Completed {
                    exit_code: Some(self.exit_code),
                },
                stdout_tail: tail.into_lines(),
                stderr_tail: Vec::new(),
            }
        })
    }
}
