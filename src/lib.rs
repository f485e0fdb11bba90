// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod logs;
pub mod types;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{load_or_default, ConfigFile};
use crate::engine::{StartedTask, StopOutcome, TaskCoordinator, TaskRequest};
use crate::exec::rewrite_script;
use crate::fs::RealFileSystem;
use crate::logs::CheckpointStore;
use crate::types::TaskState;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the task coordinator and its process backend
/// - snapshot printing
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    let cfg = load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Run {
            script,
            label,
            output_dir,
            dry_run,
        } => {
            if dry_run {
                print_dry_run(&script, &cfg)?;
                return Ok(ExitCode::SUCCESS);
            }

            let mut request = TaskRequest::new(script);
            request.label = label;
            request.output_dir = output_dir;
            run_task(&cfg, request).await
        }
        Command::Status { stale_after } => print_status(&cfg, stale_after),
    }
}

async fn run_task(cfg: &ConfigFile, request: TaskRequest) -> Result<ExitCode> {
    let coordinator = Arc::new(TaskCoordinator::from_config(cfg));
    let StartedTask {
        generation,
        logs,
        result,
        ..
    } = coordinator.start_task(request)?;

    // Ctrl-C → stop request. Repeated presses are harmless.
    let stopper = Arc::clone(&coordinator);
    let ctrl_c = tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            match stopper.request_stop() {
                StopOutcome::Requested => info!("stopping task (waiting for the process to exit)"),
                StopOutcome::AlreadyRequested => info!("stop already in progress"),
                StopOutcome::NothingToStop => return,
            }
        }
    });

    let mut final_state = TaskState::Failed;
    let mut snapshots = std::pin::pin!(logs.into_stream());
    while let Some(snapshot) = snapshots.next().await {
        println!("{snapshot}");
        println!();
        if snapshot.is_final() {
            final_state = snapshot.state;
        }
    }
    ctrl_c.abort();

    let result = result
        .await
        .context("execution unit ended without reporting a result")?;
    let text = result.text();
    if !text.is_empty() {
        println!("{text}");
    }

    debug!(generation, %final_state, "run finished");
    Ok(match final_state {
        TaskState::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// Print the rewritten script without executing anything.
fn print_dry_run(script: &Path, cfg: &ConfigFile) -> Result<()> {
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("reading script {}", script.display()))?;
    print!("{}", rewrite_script(&content, &cfg.executor));
    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_status(cfg: &ConfigFile, stale_after: Duration) -> Result<ExitCode> {
    let store = CheckpointStore::new(Arc::new(RealFileSystem), &cfg.stream.checkpoint_path);
    let Some(checkpoint) = store.load()? else {
        println!("no checkpoint at {}", store.path().display());
        return Ok(ExitCode::SUCCESS);
    };

    let stale = checkpoint.is_stale(Local::now(), stale_after);
    println!("label:       {}", checkpoint.label);
    println!("running:     {}", checkpoint.running);
    if let Some(state) = checkpoint.state {
        println!("state:       {state}");
    }
    println!("started:     {}", checkpoint.start_time);
    println!("last update: {}", checkpoint.last_update);
    println!("lines:       {}", checkpoint.line_count);
    println!("stale:       {stale}");

    Ok(if stale {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
