//! FilePlatform — SnapshotService backed by a JSON inventory document.
//!
//! Подключение:
//! - документ должен существовать, endpoint (host/port) должен совпасть,
//! - пара user/password должна быть в accounts (иначе InvalidLogin),
//! - на время соединения держится lock <inventory>.lock
//!   (rotate — exclusive, list — shared).
//!
//! Запись: после каждой успешно завершённой задачи документ переписывается
//! атомарно через tmp+rename. Если запись не удалась, задача считается
//! проваленной, а состояние в памяти откатывается к последней сохранённой
//! копии, чтобы документ и отчёт не расходились.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::inventory::Inventory;
use super::memory::MemoryPlatform;
use super::{
    ConnectParams, CreateSpec, SnapshotService, TaskHandle, TaskState, VmInfo, VmRef,
    VmSnapshotInfo,
};
use crate::consts::INVENTORY_TMP_SUFFIX;
use crate::error::PlatformError;
use crate::lock::{try_acquire_lock, LockGuard, LockMode};
use crate::snapshot::SnapshotRef;

pub struct FilePlatform {
    inner: MemoryPlatform,
    // последнее содержимое, записанное на диск
    saved: Inventory,
    path: PathBuf,
    lock: LockGuard,
}

impl FilePlatform {
    /// Read-write session (exclusive lock).
    pub fn connect(path: &Path, params: &ConnectParams) -> Result<Self, PlatformError> {
        Self::open(path, params, LockMode::Exclusive)
    }

    /// Read-only session (shared lock); mutations are refused.
    pub fn connect_read_only(path: &Path, params: &ConnectParams) -> Result<Self, PlatformError> {
        Self::open(path, params, LockMode::Shared)
    }

    fn open(path: &Path, params: &ConnectParams, mode: LockMode) -> Result<Self, PlatformError> {
        let cannot_connect = |reason: String| PlatformError::CannotConnect {
            host: params.host.clone(),
            port: params.port,
            reason,
        };

        if !path.exists() {
            return Err(cannot_connect(format!(
                "inventory {} not found",
                path.display()
            )));
        }
        let lock = try_acquire_lock(path, mode)
            .map_err(|e| cannot_connect(format!("inventory is busy: {e:#}")))?;
        let inventory =
            load_inventory(path).map_err(|e| PlatformError::Inventory(format!("{e:#}")))?;

        let ep = &inventory.endpoint;
        if !ep.host.eq_ignore_ascii_case(&params.host) || ep.port != params.port {
            return Err(cannot_connect("no such endpoint".to_string()));
        }
        let authorized = inventory
            .accounts
            .iter()
            .any(|a| a.user == params.user && a.password.as_str() == params.password.as_str());
        if !authorized {
            return Err(PlatformError::InvalidLogin {
                user: params.user.clone(),
            });
        }

        info!(
            "connected to {}:{} as '{}' ({:?})",
            params.host, params.port, params.user, mode
        );
        let inner = MemoryPlatform::new(inventory);
        Ok(Self {
            saved: inner.inventory().clone(),
            inner,
            path: path.to_path_buf(),
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn inventory(&self) -> &Inventory {
        self.inner.inventory()
    }

    pub fn is_read_only(&self) -> bool {
        self.lock.mode() == LockMode::Shared
    }

    fn ensure_writable(&self) -> Result<(), PlatformError> {
        if self.is_read_only() {
            return Err(PlatformError::Inventory(format!(
                "{} is opened read-only",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl SnapshotService for FilePlatform {
    fn list_vms(&mut self) -> Result<Vec<VmInfo>, PlatformError> {
        self.inner.list_vms()
    }

    fn snapshot_tree(&mut self, vm: &VmRef) -> Result<Option<VmSnapshotInfo>, PlatformError> {
        self.inner.snapshot_tree(vm)
    }

    fn create_snapshot(
        &mut self,
        vm: &VmRef,
        spec: &CreateSpec,
    ) -> Result<TaskHandle, PlatformError> {
        self.ensure_writable()?;
        self.inner.create_snapshot(vm, spec)
    }

    fn remove_snapshot(
        &mut self,
        vm: &VmRef,
        snapshot: &SnapshotRef,
        remove_children: bool,
    ) -> Result<TaskHandle, PlatformError> {
        self.ensure_writable()?;
        self.inner.remove_snapshot(vm, snapshot, remove_children)
    }

    fn task_state(&mut self, task: &TaskHandle) -> Result<TaskState, PlatformError> {
        let state = self.inner.task_state(task)?;
        if !self.inner.is_dirty() {
            return Ok(state);
        }
        match save_inventory(&self.path, self.inner.inventory()) {
            Ok(()) => {
                self.saved = self.inner.inventory().clone();
                self.inner.mark_clean();
                debug!("inventory {} saved after {}", self.path.display(), task);
                Ok(state)
            }
            Err(e) => {
                warn!(
                    "inventory {} not saved after {}, rolling back: {:#}",
                    self.path.display(),
                    task,
                    e
                );
                self.inner.restore_inventory(self.saved.clone());
                Err(PlatformError::Inventory(format!("{e:#}")))
            }
        }
    }
}

pub fn load_inventory(path: &Path) -> Result<Inventory> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut inv: Inventory = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse inventory {}", path.display()))?;
    inv.normalize();
    Ok(inv)
}

/// Atomic write: `<path>.tmp` then rename over `path`.
pub fn save_inventory(path: &Path, inv: &Inventory) -> Result<()> {
    let mut tmp_name: OsString = path.as_os_str().to_os_string();
    tmp_name.push(".");
    tmp_name.push(INVENTORY_TMP_SUFFIX);
    let tmp = PathBuf::from(tmp_name);

    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)
        .with_context(|| format!("open {}", tmp.display()))?;

    let data = serde_json::to_vec_pretty(inv).context("serialize inventory")?;
    f.write_all(&data)?;
    let _ = f.sync_all();

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
