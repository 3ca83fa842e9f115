//! File-based locking to prevent overlapping backup runs

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Advisory lock shared by every run that uses the same temp directory
pub struct RunLock {
    lock: RwLock<File>,
    lock_path: PathBuf,
}

impl RunLock {
    /// Lock file path for a temp directory: a sibling named `<dir>.lock`,
    /// kept outside the directory so cleanup can empty it
    pub fn path_for(temp_directory: &Path) -> PathBuf {
        let mut name = temp_directory
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "drive-backup".into());
        name.push(".lock");
        temp_directory.with_file_name(name)
    }

    /// Open (or create) the lock file without taking the lock
    pub fn open(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        Ok(Self {
            lock: RwLock::new(file),
            lock_path: lock_path.to_path_buf(),
        })
    }

    /// Take the lock, failing immediately if another run holds it.
    /// The lock is released when the guard is dropped.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        debug!("Attempting to acquire lock: {:?}", self.lock_path);
        self.lock
            .try_write()
            .with_context(|| format!("Another backup run holds the lock {:?}", self.lock_path))
    }
}
