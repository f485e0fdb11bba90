// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::parse_duration;

/// Command-line arguments for `taskstream`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskstream",
    version,
    about = "Run a script as a supervised, cancellable task and stream its logs.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `Taskstream.toml` is used when present, otherwise
    /// built-in defaults.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKSTREAM_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a script and stream snapshots of its output. Ctrl-C stops it.
    Run {
        /// Script to execute.
        script: PathBuf,

        /// Human-readable goal shown in banners and the checkpoint.
        #[arg(long, value_name = "TEXT")]
        label: Option<String>,

        /// Where the script writes its results (only echoed back).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the rewritten script instead of running it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the last checkpoint and whether it looks stale.
    Status {
        /// Age after which a running checkpoint counts as stale.
        #[arg(long, value_name = "DURATION", default_value = "90s", value_parser = parse_duration)]
        stale_after: Duration,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_parses_flags() {
        let args = CliArgs::try_parse_from([
            "taskstream",
            "--log-level",
            "debug",
            "run",
            "job.sh",
            "--label",
            "fit",
            "--dry-run",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                script,
                label,
                output_dir,
                dry_run,
            } => {
                assert_eq!(script, PathBuf::from("job.sh"));
                assert_eq!(label.as_deref(), Some("fit"));
                assert!(output_dir.is_none());
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn status_stale_after_defaults_to_90s() {
        let args = CliArgs::try_parse_from(["taskstream", "status"]).unwrap();
        match args.command {
            Command::Status { stale_after } => assert_eq!(stale_after, Duration::from_secs(90)),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
