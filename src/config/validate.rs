// src/config/validate.rs

use crate::config::model::{ConfigFile, ExecutorConfig, RawConfigFile, StreamConfig};
use crate::errors::{Result, TaskstreamError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskstreamError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.executor, raw.stream))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_executor(&cfg.executor)?;
    validate_stream(&cfg.stream)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> TaskstreamError {
    TaskstreamError::ConfigError(msg.into())
}

fn validate_executor(cfg: &ExecutorConfig) -> Result<()> {
    if cfg.shell.trim().is_empty() {
        return Err(config_error("[executor].shell must not be empty"));
    }

    if cfg.output_tail_lines == 0 {
        return Err(config_error(
            "[executor].output_tail_lines must be >= 1 (got 0)",
        ));
    }

    if cfg.grace_period.is_zero() {
        return Err(config_error("[executor].grace_period must be > 0"));
    }

    Ok(())
}

fn validate_stream(cfg: &StreamConfig) -> Result<()> {
    if cfg.max_display_lines == 0 {
        return Err(config_error(
            "[stream].max_display_lines must be >= 1 (got 0)",
        ));
    }

    if cfg.max_history_lines < cfg.max_display_lines {
        return Err(config_error(format!(
            "[stream].max_history_lines ({}) must be >= max_display_lines ({})",
            cfg.max_history_lines, cfg.max_display_lines
        )));
    }

    if cfg.heartbeat <= cfg.debounce {
        return Err(config_error(format!(
            "[stream].heartbeat ({:?}) must be longer than debounce ({:?})",
            cfg.heartbeat, cfg.debounce
        )));
    }

    if cfg.checkpoint_interval.is_zero() {
        return Err(config_error("[stream].checkpoint_interval must be > 0"));
    }

    Ok(())
}
