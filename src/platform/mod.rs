//! platform — граница между ротатором и платформой виртуализации.
//!
//! - SnapshotService: минимальный набор операций, нужный ротации
//!   (список VM, дерево снапшотов, create/remove, опрос состояния задачи).
//! - inventory.rs: serde-модель инвентаря (папки, датацентры, VM, деревья)
//!   и мутации дерева, которые выполняет платформа.
//! - memory.rs: MemoryPlatform — инвентарь в памяти + инъекция сбоев.
//! - file.rs: FilePlatform — инвентарь в JSON-файле (логин, lock, атомарная запись).

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::consts::DEFAULT_PORT;
use crate::error::PlatformError;
use crate::snapshot::{SnapshotNode, SnapshotRef};

pub mod file;
pub mod inventory;
pub mod memory;

pub use file::FilePlatform;
pub use inventory::Inventory;
pub use memory::{Fault, FaultKind, FaultOp, MemoryPlatform, PlatformCall};

/// Opaque platform reference of a VM (e.g. `vm-42`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmRef(pub String);

impl VmRef {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for VmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VmRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    #[default]
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// VM summary as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    pub id: VmRef,
    pub name: String,
    /// Datastore path of the VM config (vmPathName).
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub guest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Pending question text, if the VM is blocked on one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default)]
    pub tools_running: bool,
    /// Inventory location ("dc1/vm/prod"); filled in by discovery.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
}

/// Snapshot tree of a single VM (absent when the VM has no snapshots).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmSnapshotInfo {
    #[serde(default)]
    pub roots: Vec<SnapshotNode>,
    /// Snapshot the VM currently runs from; new snapshots become its children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<SnapshotRef>,
}

/// Parameters of a snapshot-creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub description: String,
    /// Include guest memory. Rotation always passes false.
    pub memory: bool,
    /// Quiesce the guest file system. Rotation always passes false.
    pub quiesce: bool,
}

impl CreateSpec {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, description: D) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            memory: false,
            quiesce: false,
        }
    }
}

/// Handle of an asynchronous platform task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error(PlatformError),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error(_))
    }
}

/// Snapshot operations the rotator needs from the platform.
pub trait SnapshotService {
    /// All VMs in inventory walk order.
    fn list_vms(&mut self) -> Result<Vec<VmInfo>, PlatformError>;

    /// Fresh read of the VM's snapshot tree.
    fn snapshot_tree(&mut self, vm: &VmRef) -> Result<Option<VmSnapshotInfo>, PlatformError>;

    /// Starts snapshot creation; the new snapshot becomes a child of the
    /// VM's current snapshot.
    fn create_snapshot(&mut self, vm: &VmRef, spec: &CreateSpec)
        -> Result<TaskHandle, PlatformError>;

    /// Starts removal of exactly the node `snapshot`. With
    /// `remove_children == false` its children are re-parented.
    fn remove_snapshot(
        &mut self,
        vm: &VmRef,
        snapshot: &SnapshotRef,
        remove_children: bool,
    ) -> Result<TaskHandle, PlatformError>;

    fn task_state(&mut self, task: &TaskHandle) -> Result<TaskState, PlatformError>;
}

/// Connection parameters for a platform endpoint.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Zeroizing<String>,
}

impl ConnectParams {
    pub fn new<H: Into<String>, U: Into<String>>(host: H, user: U, password: String) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: Zeroizing::new(password),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

// Пароль в Debug не выводим.
impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
