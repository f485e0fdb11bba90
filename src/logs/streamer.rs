// src/logs/streamer.rs

//! Consumer side of the log pipeline.
//!
//! A [`LogStreamer`] drains a task's log channel into a capped rolling buffer
//! and hands out rendered [`LogSnapshot`]s:
//!
//! - an `Update` when new records arrived and at least `debounce` has passed
//!   since the previous snapshot,
//! - a `Heartbeat` when nothing was emitted for `heartbeat` while the task is
//!   alive, so a polling consumer never sees a longer silence,
//! - exactly one `Final` snapshot once every producer is gone and the queue is
//!   empty, after which the sequence ends.
//!
//! Independently of emission, a [`Checkpoint`] is rewritten every
//! `checkpoint_interval` and once more with `running = false` at the end.
//!
//! The rolling buffer is owned by the streamer alone; only the channel is
//! shared with producers.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::engine::CancellationWatch;
use crate::logs::channel::LogRecord;
use crate::logs::checkpoint::{format_wall_time, Checkpoint, CheckpointStore};
use crate::logs::snapshot::{LogSnapshot, SnapshotKind};
use crate::types::TaskState;

pub struct LogStreamer {
    rx: mpsc::UnboundedReceiver<LogRecord>,
    state_rx: watch::Receiver<TaskState>,
    cancel: Option<CancellationWatch>,
    checkpoints: Option<CheckpointStore>,
    config: StreamConfig,
    label: String,
    start_wall: DateTime<Local>,
    started: Instant,

    buffer: VecDeque<LogRecord>,
    total_lines: u64,
    pending: bool,
    closed: bool,
    finished: bool,
    last_emit: Instant,
    last_checkpoint: Instant,
}

impl std::fmt::Debug for LogStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamer")
            .field("label", &self.label)
            .field("buffered", &self.buffer.len())
            .field("total_lines", &self.total_lines)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl LogStreamer {
    /// `state_rx` carries the task state; the producer side must publish a
    /// terminal state before dropping its last [`crate::logs::LogSink`].
    pub fn new(
        rx: mpsc::UnboundedReceiver<LogRecord>,
        state_rx: watch::Receiver<TaskState>,
        config: StreamConfig,
    ) -> Self {
        let now = Instant::now();
        Self {
            rx,
            state_rx,
            cancel: None,
            checkpoints: None,
            buffer: VecDeque::with_capacity(config.max_history_lines.min(1024)),
            config,
            label: String::new(),
            start_wall: Local::now(),
            started: now,
            total_lines: 0,
            pending: false,
            closed: false,
            finished: false,
            last_emit: now,
            last_checkpoint: now,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>, start_wall: DateTime<Local>) -> Self {
        self.label = label.into();
        self.start_wall = start_wall;
        self
    }

    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Report `Cancelling` in snapshots once this watch fires.
    pub fn with_cancellation(mut self, cancel: CancellationWatch) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Number of records currently held in the rolling buffer.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }

    /// Wait for the next snapshot. Returns `None` once the final snapshot has
    /// been handed out.
    pub async fn next_snapshot(&mut self) -> Option<LogSnapshot> {
        loop {
            if self.finished {
                return None;
            }

            self.drain();
            let now = Instant::now();
            self.maybe_checkpoint(now);

            if self.closed {
                return Some(self.finish(now));
            }

            let since_emit = now.duration_since(self.last_emit);
            if self.pending && since_emit >= self.config.debounce {
                return Some(self.emit(now, SnapshotKind::Update));
            }
            if since_emit >= self.config.heartbeat {
                debug!(label = %self.label, "no new output; emitting heartbeat snapshot");
                return Some(self.emit(now, SnapshotKind::Heartbeat));
            }

            let deadline = self.next_deadline();
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(record) => self.push(record),
                    None => self.closed = true,
                },
                _ = sleep_until(deadline) => {}
            }
        }
    }

    /// Consume the streamer as a one-shot `Stream` of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = LogSnapshot> + Send {
        futures::stream::unfold(self, |mut streamer| async move {
            streamer
                .next_snapshot()
                .await
                .map(|snapshot| (snapshot, streamer))
        })
    }

    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(record) => self.push(record),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }

    fn push(&mut self, record: LogRecord) {
        self.buffer.push_back(record);
        while self.buffer.len() > self.config.max_history_lines {
            self.buffer.pop_front();
        }
        self.total_lines += 1;
        self.pending = true;
    }

    fn next_deadline(&self) -> Instant {
        let mut deadline = (self.last_emit + self.config.heartbeat)
            .min(self.last_checkpoint + self.config.checkpoint_interval);
        if self.pending {
            deadline = deadline.min(self.last_emit + self.config.debounce);
        }
        deadline
    }

    fn current_state(&self) -> TaskState {
        let state = *self.state_rx.borrow();
        let cancel_requested = self
            .cancel
            .as_ref()
            .is_some_and(CancellationWatch::is_cancelled);
        if state == TaskState::Running && cancel_requested {
            TaskState::Cancelling
        } else {
            state
        }
    }

    fn snapshot(&self, now: Instant, state: TaskState, kind: SnapshotKind) -> LogSnapshot {
        let shown = self.buffer.len().min(self.config.max_display_lines);
        let lines: Vec<LogRecord> = self
            .buffer
            .iter()
            .skip(self.buffer.len() - shown)
            .cloned()
            .collect();

        LogSnapshot {
            truncated_count: self.total_lines - lines.len() as u64,
            lines,
            total_lines_seen: self.total_lines,
            elapsed: now.duration_since(self.started),
            state,
            kind,
        }
    }

    fn emit(&mut self, now: Instant, kind: SnapshotKind) -> LogSnapshot {
        let snapshot = self.snapshot(now, self.current_state(), kind);
        self.pending = false;
        self.last_emit = now;
        snapshot
    }

    fn finish(&mut self, now: Instant) -> LogSnapshot {
        let mut state = *self.state_rx.borrow();
        if !state.is_terminal() {
            warn!(
                label = %self.label,
                %state,
                "log producers finished without a terminal task state; reporting failure"
            );
            state = TaskState::Failed;
        }

        self.finished = true;
        self.pending = false;
        self.write_checkpoint(false, Some(state));

        debug!(
            label = %self.label,
            total_lines = self.total_lines,
            %state,
            "log stream finished"
        );
        self.snapshot(now, state, SnapshotKind::Final)
    }

    fn maybe_checkpoint(&mut self, now: Instant) {
        if now.duration_since(self.last_checkpoint) >= self.config.checkpoint_interval {
            self.write_checkpoint(true, None);
            self.last_checkpoint = now;
        }
    }

    fn write_checkpoint(&self, running: bool, state: Option<TaskState>) {
        let Some(store) = &self.checkpoints else {
            return;
        };
        store.save_or_warn(&Checkpoint {
            running,
            label: self.label.clone(),
            start_time: format_wall_time(self.start_wall),
            line_count: self.total_lines,
            last_update: format_wall_time(Local::now()),
            state,
        });
    }
}
