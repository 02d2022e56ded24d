//! Typed errors at the platform and snapshot-resolution seams.
//!
//! Orchestration code wraps these into `anyhow::Error`; callers that need to
//! tell fatal failures (login, connect) from per-action ones use
//! `downcast_ref::<PlatformError>()`.

use thiserror::Error;

use crate::platform::{TaskHandle, VmRef};
use crate::snapshot::SnapshotRef;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid login for user '{user}'")]
    InvalidLogin { user: String },

    #[error("cannot connect to {host}:{port}: {reason}")]
    CannotConnect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("vm {0} not found")]
    VmNotFound(VmRef),

    #[error("snapshot {snapshot} not found on vm {vm}")]
    SnapshotNotFound { vm: VmRef, snapshot: SnapshotRef },

    #[error("task {0} not found")]
    TaskNotFound(TaskHandle),

    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Временный сбой платформы: операцию можно повторить.
    #[error("transient platform failure: {0}")]
    Transient(String),

    #[error("task {task} did not finish within {waited_ms} ms")]
    TaskTimeout { task: TaskHandle, waited_ms: u64 },

    #[error("inventory: {0}")]
    Inventory(String),
}

impl PlatformError {
    /// Login/connect failures abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlatformError::InvalidLogin { .. } | PlatformError::CannotConnect { .. }
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum RotateError {
    #[error("snapshot {snapshot} no longer present in the tree of vm {vm}")]
    SnapshotNotFound { vm: VmRef, snapshot: SnapshotRef },

    #[error("snapshot {snapshot} matches {matches} nodes in the tree of vm {vm}")]
    AmbiguousSnapshot {
        vm: VmRef,
        snapshot: SnapshotRef,
        matches: usize,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}
