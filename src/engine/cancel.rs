// src/engine/cancel.rs

//! Generation-scoped, one-way cancellation signal.
//!
//! The coordinator owns one [`CancellationSignal`] for its whole life. Every
//! new task advances the generation (which also clears the flag); a stop
//! request sets the flag for the *current* generation only. Observers hold a
//! [`CancellationWatch`] bound to the generation they were created for, so a
//! watcher left over from a previous task sees "superseded" instead of a
//! cancellation meant for someone else.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flag {
    generation: u64,
    cancelled: bool,
}

/// Why a [`CancellationWatch::cancelled`] wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Stop was requested for this watch's generation.
    Requested,
    /// A newer generation started; this watcher is stale.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<Flag>>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Flag {
            generation: 0,
            cancelled: false,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    /// Start a new generation with the flag cleared. Returns the new
    /// generation number.
    pub fn advance(&self) -> u64 {
        let mut next = 0;
        self.tx.send_modify(|flag| {
            flag.generation += 1;
            flag.cancelled = false;
            next = flag.generation;
        });
        next
    }

    /// Set the flag for `generation`. Returns `true` only for the call that
    /// actually flipped it; stale generations are ignored.
    pub fn cancel(&self, generation: u64) -> bool {
        self.tx.send_if_modified(|flag| {
            if flag.generation == generation && !flag.cancelled {
                flag.cancelled = true;
                true
            } else {
                false
            }
        })
    }

    pub fn is_cancelled(&self, generation: u64) -> bool {
        let flag = *self.tx.borrow();
        flag.generation == generation && flag.cancelled
    }

    /// Observer bound to `generation`.
    pub fn watch(&self, generation: u64) -> CancellationWatch {
        CancellationWatch {
            generation,
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancellationWatch {
    generation: u64,
    rx: watch::Receiver<Flag>,
}

impl CancellationWatch {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        let flag = *self.rx.borrow();
        flag.generation == self.generation && flag.cancelled
    }

    pub fn is_superseded(&self) -> bool {
        self.rx.borrow().generation != self.generation
    }

    /// Resolve once stop is requested for this generation or a newer
    /// generation starts. A dropped signal counts as superseded.
    pub async fn cancelled(&mut self) -> CancelReason {
        let generation = self.generation;
        let outcome = self
            .rx
            .wait_for(|flag| flag.generation != generation || flag.cancelled)
            .await
            .map(|flag| *flag);

        match outcome {
            Ok(flag) if flag.generation == generation => CancelReason::Requested,
            _ => CancelReason::Superseded,
        }
    }
}
