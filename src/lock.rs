//! Advisory locking of the inventory document.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: rotate (мутирует инвентарь), один процесс за раз.
//! - Shared: list (только чтение), несколько читателей одновременно.
//!
//! Lock file path: <inventory>.lock
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::consts::INVENTORY_LOCK_SUFFIX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    fn new(file: std::fs::File, path: PathBuf, mode: LockMode) -> Self {
        Self { file, path, mode }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// `<target>.lock` next to the locked file.
pub fn lock_file_path(target: &Path) -> PathBuf {
    let mut s: OsString = target.as_os_str().to_os_string();
    s.push(".");
    s.push(INVENTORY_LOCK_SUFFIX);
    PathBuf::from(s)
}

fn open_lock_file(target: &Path) -> Result<std::fs::File> {
    let path = lock_file_path(target);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok(f)
}

/// Try to acquire a lock in the requested mode. Returns Err if already locked.
pub fn try_acquire_lock(target: &Path, mode: LockMode) -> Result<LockGuard> {
    let file = open_lock_file(target)?;
    let path = lock_file_path(target);
    match mode {
        LockMode::Shared => file
            .try_lock_shared()
            .with_context(|| format!("try_lock_shared failed: {}", path.display()))?,
        LockMode::Exclusive => file
            .try_lock_exclusive()
            .with_context(|| format!("try_lock_exclusive failed: {}", path.display()))?,
    }
    Ok(LockGuard::new(file, path, mode))
}
