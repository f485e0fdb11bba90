// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Only caller-visible failures live here. Failures that happen *inside* a
//! running script (spawn errors, broken pipes, interruption) are captured in
//! [`crate::exec::ExecutionResult`] instead of being returned as `Err`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskstreamError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("a task is already running (generation {generation})")]
    AlreadyRunning { generation: u64 },

    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskstreamError>;
