// src/exec/env.rs

//! Child-process environment preparation.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::config::ExecutorConfig;

/// Expand a leading `~/` to the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Compute a `PATH` with the `bin/` of the first existing toolchain directory
/// in front.
///
/// Returns `None` when nothing needs to change: no candidate exists, or its
/// `bin/` is already on the path.
pub fn augmented_path(toolchain_dirs: &[PathBuf], current: Option<&OsStr>) -> Option<OsString> {
    let root = toolchain_dirs
        .iter()
        .map(|d| expand_home(d))
        .find(|d| d.exists())?;
    let bin = root.join("bin");

    let mut entries: Vec<PathBuf> = current
        .map(|p| env::split_paths(p).collect())
        .unwrap_or_default();
    if entries.contains(&bin) {
        return None;
    }

    entries.insert(0, bin);
    env::join_paths(entries).ok()
}

/// Apply the configured environment to a child command. Best effort: a
/// missing toolchain leaves `PATH` untouched.
pub fn apply_child_env(cmd: &mut Command, cfg: &ExecutorConfig) {
    let current = env::var_os("PATH");
    if let Some(path) = augmented_path(&cfg.toolchain_dirs, current.as_deref()) {
        debug!(path = ?path, "augmenting PATH with toolchain bin directory");
        cmd.env("PATH", path);
    }

    for (key, value) in &cfg.env {
        cmd.env(key, value);
    }
}
