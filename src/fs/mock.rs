// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory filesystem that also remembers every write in order.
///
/// Clones share the same backing store, so a test can keep one handle while
/// the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    history: Arc<Mutex<Vec<(PathBuf, Vec<u8>)>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.lock_files()
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Every successful `write`, oldest first.
    pub fn writes(&self) -> Vec<(PathBuf, Vec<u8>)> {
        lock(&self.history).clone()
    }

    /// Make every subsequent `write` fail (to exercise error paths).
    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    fn lock_files(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        lock(&self.files)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.lock_files();
        match files.get(path) {
            Some(content) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if *lock(&self.fail_writes) {
            return Err(anyhow!("simulated write failure for {:?}", path));
        }
        self.add_file(path, contents);
        lock(&self.history).push((path.to_path_buf(), contents.to_vec()));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.lock_files();
        let content = files
            .remove(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        files.insert(to.to_path_buf(), content);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock_files().contains_key(path)
    }
}
