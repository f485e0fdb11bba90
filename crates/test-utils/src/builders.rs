#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use taskstream::config::{ConfigFile, ExecutorConfig, RawConfigFile, StreamConfig};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from defaults with no toolchain directories, so tests never pick up
/// whatever happens to be installed on the host.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.executor.toolchain_dirs.clear();
        Self { config }
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.config.executor.shell = shell.to_string();
        self
    }

    pub fn setup_command(mut self, cmd: &str) -> Self {
        self.config.executor.setup_commands.push(cmd.to_string());
        self
    }

    pub fn postfix_command(mut self, cmd: &str) -> Self {
        self.config.executor.postfix_commands.push(cmd.to_string());
        self
    }

    pub fn activation_directive(mut self, directive: &str) -> Self {
        self.config.executor.activation_directive = directive.to_string();
        self
    }

    pub fn stderr_noise(mut self, pattern: &str) -> Self {
        self.config.executor.stderr_noise.push(pattern.to_string());
        self
    }

    pub fn output_tail_lines(mut self, n: usize) -> Self {
        self.config.executor.output_tail_lines = n;
        self
    }

    pub fn grace_period(mut self, d: Duration) -> Self {
        self.config.executor.grace_period = d;
        self
    }

    pub fn history(mut self, max_history: usize, max_display: usize) -> Self {
        self.config.stream.max_history_lines = max_history;
        self.config.stream.max_display_lines = max_display;
        self
    }

    pub fn debounce(mut self, d: Duration) -> Self {
        self.config.stream.debounce = d;
        self
    }

    pub fn heartbeat(mut self, d: Duration) -> Self {
        self.config.stream.heartbeat = d;
        self
    }

    pub fn checkpoint_interval(mut self, d: Duration) -> Self {
        self.config.stream.checkpoint_interval = d;
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stream.checkpoint_path = path.into();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn executor(self) -> ExecutorConfig {
        self.build().executor
    }

    pub fn stream(self) -> StreamConfig {
        self.build().stream
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
