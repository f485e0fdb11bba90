// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`script`] rewrites a script into its `.execute.sh` form.
//! - [`env`] prepares the child environment.
//! - [`signal`] sends termination signals to whole process groups.
//! - [`executor`] spawns and supervises one script, streaming its output.
//! - [`monitor`] turns a stop request into a termination.
//! - [`result`] is what an execution hands back.
//! - [`backend`] is the seam the coordinator uses, so tests can replace the
//!   real process executor with a fake.

pub mod backend;
pub mod env;
pub mod executor;
pub mod monitor;
pub mod result;
pub mod script;
pub mod signal;

pub use backend::{ExecutorBackend, ProcessBackend};
pub use executor::{ProcessControl, ProcessExecutor, ProcessHandle, TerminateOutcome};
pub use monitor::{CancellationMonitor, MonitorExit, Terminator};
pub use result::{ExecutionOutcome, ExecutionResult, OutputTail, INTERRUPTED_MARKER};
pub use script::{execute_path, rewrite_script};
