// src/exec/monitor.rs

//! Background observer that turns a stop request into a termination.
//!
//! One monitor is started per spawned process. It waits on the task's
//! [`CancellationWatch`] and, when stop is requested for its generation,
//! calls [`Terminator::stop`] exactly once. A monitor whose generation has
//! been superseded exits without touching anything.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{CancelReason, CancellationWatch};
use crate::exec::executor::ProcessControl;

/// Something that can stop the process a monitor is guarding.
pub trait Terminator: Send + Sync {
    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl Terminator for ProcessControl {
    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let outcome = self.terminate().await;
            debug!(?outcome, "monitor-triggered termination finished");
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Stop was requested and the terminator ran.
    Terminated,
    /// A newer task started; nothing was done.
    Superseded,
}

#[derive(Debug)]
pub struct CancellationMonitor {
    fired: Arc<AtomicBool>,
    handle: JoinHandle<MonitorExit>,
}

impl CancellationMonitor {
    pub fn spawn(mut watch: CancellationWatch, terminator: Arc<dyn Terminator>) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let generation = watch.generation();

        let handle = tokio::spawn(async move {
            match watch.cancelled().await {
                CancelReason::Requested => {
                    flag.store(true, Ordering::SeqCst);
                    info!(generation, "stop requested; terminating process");
                    terminator.stop().await;
                    MonitorExit::Terminated
                }
                CancelReason::Superseded => {
                    debug!(generation, "monitor superseded by newer task");
                    MonitorExit::Superseded
                }
            }
        });

        Self { fired, handle }
    }

    /// True once the monitor has started terminating.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Wait for the monitor to exit on its own.
    pub async fn join(self) -> Option<MonitorExit> {
        match self.handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!(error = %e, "cancellation monitor task failed");
                None
            }
        }
    }

    /// Called once the process is gone. A monitor that already fired is
    /// awaited so its termination sequence finishes; an idle one is aborted.
    pub async fn shutdown(self) {
        if self.has_fired() {
            self.join().await;
        } else {
            self.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::engine::CancellationSignal;

    #[derive(Default)]
    struct CountingTerminator {
        stops: AtomicUsize,
    }

    impl Terminator for CountingTerminator {
        fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.stops.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn requested_stop_terminates_once() {
        let signal = CancellationSignal::new();
        let generation = signal.advance();
        let terminator = Arc::new(CountingTerminator::default());

        let monitor = CancellationMonitor::spawn(signal.watch(generation), terminator.clone());
        signal.cancel(generation);
        signal.cancel(generation);

        assert_eq!(monitor.join().await, Some(MonitorExit::Terminated));
        assert_eq!(terminator.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn superseded_monitor_does_nothing() {
        let signal = CancellationSignal::new();
        let old = signal.advance();
        let terminator = Arc::new(CountingTerminator::default());

        let monitor = CancellationMonitor::spawn(signal.watch(old), terminator.clone());
        let new = signal.advance();
        signal.cancel(new);

        assert_eq!(monitor.join().await, Some(MonitorExit::Superseded));
        assert_eq!(terminator.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn idle_monitor_is_aborted_on_shutdown() {
        let signal = CancellationSignal::new();
        let generation = signal.advance();
        let terminator = Arc::new(CountingTerminator::default());

        let monitor = CancellationMonitor::spawn(signal.watch(generation), terminator.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!monitor.has_fired());
        monitor.shutdown().await;

        signal.cancel(generation);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(terminator.stops.load(Ordering::SeqCst), 0);
    }
}
