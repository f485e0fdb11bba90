// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration::deserialize_duration;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [executor]
/// shell = "bash"
/// setup_commands = ['eval "$(mamba shell hook --shell bash)"', "mamba activate abc_runtime"]
/// grace_period = "2s"
///
/// [executor.env]
/// CONDA_AUTO_ACTIVATE_BASE = "false"
///
/// [stream]
/// heartbeat = "10s"
/// checkpoint_path = ".task_state.json"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub stream: StreamConfig,
}

/// Validated configuration. Build it through `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub executor: ExecutorConfig,
    pub stream: StreamConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(executor: ExecutorConfig, stream: StreamConfig) -> Self {
        Self { executor, stream }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(ExecutorConfig::default(), StreamConfig::default())
    }
}

/// `[executor]` section: how a script is rewritten, spawned and stopped.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Interpreter used to run the rewritten script.
    pub shell: String,

    /// Arguments placed before the script path (`bash -e script`).
    pub shell_args: Vec<String>,

    /// Lines prepended to every script exactly once.
    pub setup_commands: Vec<String>,

    /// Lines appended to every script exactly once.
    pub postfix_commands: Vec<String>,

    /// Substring identifying the environment activation line. Only the first
    /// matching line survives the rewrite.
    pub activation_directive: String,

    /// Substrings identifying lines that are dropped from the script body.
    pub discard_directives: Vec<String>,

    /// Substrings identifying stderr lines produced by the activation tool.
    /// Matching is plain `contains`, not a pattern.
    pub stderr_noise: Vec<String>,

    /// Candidate toolchain installations. The `bin/` of the first one that
    /// exists is put in front of `PATH`; `~/` is expanded.
    pub toolchain_dirs: Vec<PathBuf>,

    /// Extra environment variables for the child.
    pub env: BTreeMap<String, String>,

    /// Number of trailing lines per stream kept in the returned result.
    pub output_tail_lines: usize,

    /// Time between the graceful and the forceful group signal.
    #[serde(deserialize_with = "deserialize_duration")]
    pub grace_period: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("CONDA_AUTO_ACTIVATE_BASE".to_string(), "false".to_string());

        Self {
            shell: "bash".to_string(),
            shell_args: vec!["-e".to_string()],
            setup_commands: Vec::new(),
            postfix_commands: Vec::new(),
            activation_directive: "mamba activate abc_runtime".to_string(),
            discard_directives: vec!["conda shell.bash hook".to_string()],
            stderr_noise: vec![
                "EnvironmentNameNotFound".to_string(),
                "terminal process group".to_string(),
                "no job control".to_string(),
                "shell.bash hook".to_string(),
            ],
            toolchain_dirs: vec![
                PathBuf::from("~/mambaforge"),
                PathBuf::from("~/miniconda3"),
                PathBuf::from("/opt/conda"),
            ],
            env,
            output_tail_lines: 10,
            grace_period: Duration::from_secs(2),
        }
    }
}

/// `[stream]` section: snapshot pacing and checkpoint persistence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Rolling buffer capacity (H). Oldest records are evicted first.
    pub max_history_lines: usize,

    /// Number of most recent lines rendered per snapshot (D).
    pub max_display_lines: usize,

    /// Minimum spacing between two data-driven snapshots.
    #[serde(deserialize_with = "deserialize_duration")]
    pub debounce: Duration,

    /// Maximum silence between snapshots while the task is alive.
    #[serde(deserialize_with = "deserialize_duration")]
    pub heartbeat: Duration,

    /// How often the checkpoint file is rewritten.
    #[serde(deserialize_with = "deserialize_duration")]
    pub checkpoint_interval: Duration,

    /// Well-known location of the checkpoint file.
    pub checkpoint_path: PathBuf,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_history_lines: 500,
            max_display_lines: 100,
            debounce: Duration::from_millis(100),
            heartbeat: Duration::from_secs(10),
            checkpoint_interval: Duration::from_secs(30),
            checkpoint_path: PathBuf::from(".task_state.json"),
        }
    }
}
