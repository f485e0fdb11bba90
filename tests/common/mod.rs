#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub use taskstream_test_utils::builders::ConfigFileBuilder;
pub use taskstream_test_utils::fake_executor::FakeExecutor;
pub use taskstream_test_utils::{init_tracing, with_timeout};

/// Write `body` as an executable-looking script inside `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("failed to write test script");
    path
}
