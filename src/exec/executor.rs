// src/exec/executor.rs

//! Supervised execution of one script as a process-group leader.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::engine::CancellationWatch;
use crate::exec::env::apply_child_env;
use crate::exec::monitor::CancellationMonitor;
use crate::exec::result::{ExecutionOutcome, ExecutionResult, OutputTail};
use crate::exec::script::{execute_path, rewrite_script};
use crate::exec::signal::{process_group_of, signal_group, signal_process, TermSignal};
use crate::logs::LogSink;
use crate::types::{ProcessLifecycle, StreamOrigin};

/// How long stderr may stay open after an interrupted stdout loop before the
/// remainder is dropped.
const STDERR_DRAIN_LIMIT: Duration = Duration::from_millis(500);

/// Identity and lifecycle of the process currently owned by an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// `None` when the group could not be determined; termination then only
    /// targets the process itself.
    pub pgid: Option<i32>,
    pub lifecycle: ProcessLifecycle,
}

/// What a `terminate` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Nothing to do: no process, or it already exited / is being stopped.
    NotRunning,
    /// Exited within the grace period after the graceful signal.
    Graceful,
    /// Needed the forceful signal.
    Forced,
    /// Survived both signals; the executor gave up waiting on it.
    EscalationFailed,
}

/// Shared control block between the read loop and whoever terminates it.
#[derive(Debug)]
pub struct ProcessControl {
    current: Mutex<Option<ProcessHandle>>,
    interrupted: watch::Sender<bool>,
    exited: watch::Sender<bool>,
    kill_requested: watch::Sender<bool>,
    abandoned: watch::Sender<bool>,
    grace_period: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessControl {
    fn new(grace_period: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            interrupted: watch::Sender::new(false),
            exited: watch::Sender::new(false),
            kill_requested: watch::Sender::new(false),
            abandoned: watch::Sender::new(false),
            grace_period,
        }
    }

    pub fn current(&self) -> Option<ProcessHandle> {
        *lock(&self.current)
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupted.borrow()
    }

    fn reset(&self) {
        *lock(&self.current) = None;
        self.interrupted.send_replace(false);
        self.exited.send_replace(false);
        self.kill_requested.send_replace(false);
        self.abandoned.send_replace(false);
    }

    fn register(&self, handle: ProcessHandle) {
        *lock(&self.current) = Some(handle);
    }

    /// Move `Spawned → Running` unless a terminate already moved it on.
    fn mark_running(&self) {
        if let Some(handle) = lock(&self.current).as_mut() {
            if handle.lifecycle == ProcessLifecycle::Spawned {
                handle.lifecycle = ProcessLifecycle::Running;
            }
        }
    }

    /// Record the final lifecycle, wake any pending `terminate`, and release
    /// the handle.
    fn finish(&self, lifecycle: ProcessLifecycle) {
        let previous = {
            let mut guard = lock(&self.current);
            if let Some(handle) = guard.as_mut() {
                handle.lifecycle = lifecycle;
            }
            guard.take()
        };
        self.exited.send_replace(true);
        if let Some(handle) = previous {
            debug!(pid = handle.pid, lifecycle = ?handle.lifecycle, "process handle released");
        }
    }

    /// Stop the current process: graceful signal to the whole group, then a
    /// forceful one after the grace period.
    ///
    /// Idempotent: with no live process this only logs.
    pub async fn terminate(&self) -> TerminateOutcome {
        let target = {
            let mut guard = lock(&self.current);
            match guard.as_mut() {
                Some(handle) if handle.lifecycle.is_live() => {
                    handle.lifecycle = ProcessLifecycle::Terminating;
                    Some(*handle)
                }
                _ => None,
            }
        };

        let Some(handle) = target else {
            info!("no active process to terminate");
            return TerminateOutcome::NotRunning;
        };

        // Let the read loop stop before the signal lands.
        self.interrupted.send_replace(true);

        info!(pid = handle.pid, pgid = ?handle.pgid, "terminating process group");
        self.send(&handle, TermSignal::Graceful);
        if self.wait_exit(self.grace_period).await {
            info!(pid = handle.pid, "process group terminated");
            return TerminateOutcome::Graceful;
        }

        warn!(
            pid = handle.pid,
            grace_period = ?self.grace_period,
            "process still alive after grace period; force killing"
        );
        self.send(&handle, TermSignal::Forceful);
        if self.wait_exit(self.grace_period).await {
            info!(pid = handle.pid, "process group killed");
            return TerminateOutcome::Forced;
        }

        error!(
            pid = handle.pid,
            "process survived forceful kill; abandoning it and marking it killed"
        );
        if let Some(current) = lock(&self.current).as_mut() {
            current.lifecycle = ProcessLifecycle::Killed;
        }
        self.abandoned.send_replace(true);
        TerminateOutcome::EscalationFailed
    }

    /// Signal the whole group. If that is impossible, fall back to the
    /// process itself: SIGTERM directly, SIGKILL through `Child::start_kill`
    /// in the read loop.
    fn send(&self, handle: &ProcessHandle, signal: TermSignal) {
        let result = match handle.pgid {
            Some(pgid) => signal_group(pgid, signal),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "process group unknown",
            )),
        };

        let Err(e) = result else {
            return;
        };
        warn!(
            pid = handle.pid,
            ?signal,
            error = %e,
            "group signal failed; falling back to signalling the process only"
        );

        match signal {
            TermSignal::Graceful => {
                if let Err(e) = signal_process(handle.pid, TermSignal::Graceful) {
                    warn!(pid = handle.pid, error = %e, "graceful signal to process failed");
                }
            }
            TermSignal::Forceful => {
                self.kill_requested.send_replace(true);
            }
        }
    }

    async fn wait_exit(&self, limit: Duration) -> bool {
        let mut rx = self.exited.subscribe();
        matches!(timeout(limit, rx.wait_for(|exited| *exited)).await, Ok(Ok(_)))
    }
}

/// Runs one script at a time as an isolated, terminable process group.
///
/// Output is streamed line by line into the optional [`LogSink`]; the
/// returned [`ExecutionResult`] keeps only the last `output_tail_lines` of
/// each stream. Spawn and I/O failures end up in the result, never as `Err`.
#[derive(Debug)]
pub struct ProcessExecutor {
    config: ExecutorConfig,
    sink: Option<LogSink>,
    control: Arc<ProcessControl>,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let control = Arc::new(ProcessControl::new(config.grace_period));
        Self {
            config,
            sink: None,
            control,
        }
    }

    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Handle used by other tasks to terminate the running script.
    pub fn control(&self) -> Arc<ProcessControl> {
        Arc::clone(&self.control)
    }

    pub fn current_process(&self) -> Option<ProcessHandle> {
        self.control.current()
    }

    pub async fn terminate(&self) -> TerminateOutcome {
        self.control.terminate().await
    }

    /// Rewrite, spawn and supervise `script`.
    ///
    /// The caller guarantees this executor is not already running something.
    pub async fn execute(&self, script: &Path, cancel: CancellationWatch) -> ExecutionResult {
        self.control.reset();

        if cancel.is_cancelled() {
            info!(script = %script.display(), "stop requested before spawn; not starting process");
            return ExecutionResult::interrupted(Vec::new(), Vec::new());
        }

        match self.execute_inner(script, cancel).await {
            Ok(result) => result,
            Err(err) => {
                error!(script = %script.display(), error = %format!("{err:#}"), "execution error");
                self.control.finish(ProcessLifecycle::Killed);
                ExecutionResult::failed(format!("{err:#}"))
            }
        }
    }

    async fn execute_inner(&self, script: &Path, cancel: CancellationWatch) -> Result<ExecutionResult> {
        let content = tokio::fs::read_to_string(script)
            .await
            .with_context(|| format!("reading script {}", script.display()))?;
        let rewritten = rewrite_script(&content, &self.config);
        let exec_path = execute_path(script);
        tokio::fs::write(&exec_path, rewritten)
            .await
            .with_context(|| format!("writing {}", exec_path.display()))?;

        let mut cmd = Command::new(&self.config.shell);
        cmd.args(&self.config.shell_args)
            .arg(&exec_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        apply_child_env(&mut cmd, &self.config);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}' for {}", self.config.shell, exec_path.display()))?;
        let pid = child.id().context("spawned process has no pid")?;
        let pgid = process_group_of(pid);

        self.control.register(ProcessHandle {
            pid,
            pgid,
            lifecycle: ProcessLifecycle::Spawned,
        });
        info!(pid, ?pgid, script = %exec_path.display(), "process started");

        // Registered first so an already-set stop flag finds the process.
        let monitor = CancellationMonitor::spawn(cancel, self.control());
        self.control.mark_running();

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;

        let stderr_tail = Arc::new(Mutex::new(OutputTail::new(self.config.output_tail_lines)));
        let stderr_task = tokio::spawn(collect_stderr(
            stderr,
            self.config.stderr_noise.clone(),
            Arc::clone(&stderr_tail),
            self.sink.clone(),
        ));

        let mut stdout_tail = OutputTail::new(self.config.output_tail_lines);
        self.read_stdout(pid, stdout, &mut stdout_tail).await;

        let interrupted = self.control.is_interrupted();
        let status = self.wait_for_exit(&mut child).await;
        let lifecycle = match &status {
            Some(Ok(s)) => match s.code() {
                Some(code) => ProcessLifecycle::Exited(code),
                None => ProcessLifecycle::Killed,
            },
            Some(Err(e)) => {
                warn!(pid, error = %e, "failed to wait for process");
                ProcessLifecycle::Killed
            }
            None => ProcessLifecycle::Killed,
        };
        info!(pid, ?lifecycle, "process finished");
        self.control.finish(lifecycle);
        monitor.shutdown().await;

        let abort = stderr_task.abort_handle();
        let drained = if interrupted {
            timeout(STDERR_DRAIN_LIMIT, stderr_task).await.ok()
        } else {
            Some(stderr_task.await)
        };
        match drained {
            Some(Ok(())) => {}
            Some(Err(e)) => warn!(pid, error = %e, "stderr reader task failed"),
            None => {
                abort.abort();
                debug!(pid, "stderr still open after interruption; dropping the rest");
            }
        }
        let stderr_lines = std::mem::take(&mut *lock(&stderr_tail)).into_lines();
        let stdout_lines = stdout_tail.into_lines();

        let interrupted = interrupted || self.control.is_interrupted();
        if interrupted {
            info!(pid, "execution interrupted by user");
            return Ok(ExecutionResult::interrupted(stdout_lines, stderr_lines));
        }

        let exit_code = match lifecycle {
            ProcessLifecycle::Exited(code) => Some(code),
            _ => None,
        };
        Ok(ExecutionResult {
            outcome: ExecutionOutcome::Completed { exit_code },
            stdout_tail: stdout_lines,
            stderr_tail: stderr_lines,
        })
    }

    /// Read stdout until EOF, a read error, or the interrupted flag.
    async fn read_stdout<R>(&self, pid: u32, stdout: R, tail: &mut OutputTail)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(stdout).lines();
        let mut interrupted = self.control.interrupted.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = interrupted.wait_for(|flag| *flag) => {
                    debug!(pid, "interrupted flag set; leaving stdout loop");
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        debug!(pid, "stdout: {}", line);
                        self.publish(StreamOrigin::Stdout, &line);
                        tail.push(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(pid, error = %e, "stdout read failed; keeping partial output");
                        self.publish(StreamOrigin::Stderr, &format!("stdout read error: {e}"));
                        break;
                    }
                },
            }
        }
    }

    /// Wait for the child, honouring a process-only kill fallback and an
    /// abandoned escalation. `None` means the process was given up on.
    async fn wait_for_exit(&self, child: &mut Child) -> Option<std::io::Result<ExitStatus>> {
        let mut kill_rx = self.control.kill_requested.subscribe();
        let mut abandoned_rx = self.control.abandoned.subscribe();

        tokio::select! {
            status = child.wait() => return Some(status),
            _ = kill_rx.wait_for(|k| *k) => {}
            _ = abandoned_rx.wait_for(|a| *a) => return None,
        }

        if let Err(e) = child.start_kill() {
            warn!(error = %e, "failed to kill process directly");
        }
        tokio::select! {
            status = child.wait() => Some(status),
            _ = abandoned_rx.wait_for(|a| *a) => None,
        }
    }

    fn publish(&self, origin: StreamOrigin, text: &str) {
        if let Some(sink) = &self.sink {
            sink.publish_from(origin, text);
        }
    }
}

async fn collect_stderr<R>(
    stderr: R,
    noise: Vec<String>,
    tail: Arc<Mutex<OutputTail>>,
    sink: Option<LogSink>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() || noise.iter().any(|n| line.contains(n.as_str())) {
            continue;
        }
        debug!("stderr: {}", line);
        if let Some(sink) = &sink {
            sink.publish_from(StreamOrigin::Stderr, line.as_str());
        }
        lock(&tail).push(line);
    }
}
