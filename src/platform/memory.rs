//! MemoryPlatform — SnapshotService over an in-memory inventory.
//!
//! Задачи выполняются при первом опросе task_state(): так ожидание задачи в
//! ротаторе проходит тот же путь, что и с настоящей платформой. Сбои
//! (отказ при постановке, ошибка задачи, временная ошибка, зависание)
//! задаются через Fault.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::BTreeMap;

use super::inventory::Inventory;
use super::{CreateSpec, SnapshotService, TaskHandle, TaskState, VmInfo, VmRef, VmSnapshotInfo};
use crate::consts::TASK_REF_PREFIX;
use crate::error::PlatformError;
use crate::snapshot::SnapshotRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    ReadTree,
    Create,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// Request rejected up front, no task is created.
    Reject(String),
    /// Task is accepted and ends in error.
    FailTask(String),
    /// Task ends with a retryable error; nothing is applied.
    Transient(String),
    /// Task never reaches a terminal state.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Fault {
    pub op: FaultOp,
    pub vm: Option<VmRef>,
    pub kind: FaultKind,
    pub times: u32,
}

impl Fault {
    pub fn new(op: FaultOp, kind: FaultKind) -> Self {
        Self {
            op,
            vm: None,
            kind,
            times: 1,
        }
    }

    pub fn on_vm<V: Into<VmRef>>(mut self, vm: V) -> Self {
        self.vm = Some(vm.into());
        self
    }

    pub fn times(mut self, n: u32) -> Self {
        self.times = n;
        self
    }
}

/// Record of a request made against the platform, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    ListVms,
    ReadTree(VmRef),
    Create {
        vm: VmRef,
        name: String,
        memory: bool,
        quiesce: bool,
    },
    Remove {
        vm: VmRef,
        snapshot: SnapshotRef,
        remove_children: bool,
    },
}

impl PlatformCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, PlatformCall::Create { .. } | PlatformCall::Remove { .. })
    }
}

#[derive(Debug)]
enum PendingOp {
    Create {
        vm: VmRef,
        spec: CreateSpec,
    },
    Remove {
        vm: VmRef,
        snapshot: SnapshotRef,
        remove_children: bool,
    },
}

#[derive(Debug)]
struct TaskEntry {
    op: Option<PendingOp>,
    state: TaskState,
    fault: Option<FaultKind>,
}

pub struct MemoryPlatform {
    inventory: Inventory,
    faults: Vec<Fault>,
    tasks: BTreeMap<TaskHandle, TaskEntry>,
    calls: Vec<PlatformCall>,
    next_task: u64,
    clock: Option<DateTime<Utc>>,
    dirty: bool,
}

impl MemoryPlatform {
    pub fn new(mut inventory: Inventory) -> Self {
        inventory.normalize();
        Self {
            inventory,
            faults: Vec::new(),
            tasks: BTreeMap::new(),
            calls: Vec::new(),
            next_task: 1,
            clock: None,
            dirty: false,
        }
    }

    /// Fixed clock: snapshots get `start`, `start + 1s`, ... as create time.
    pub fn with_clock(mut self, start: DateTime<Utc>) -> Self {
        self.clock = Some(start);
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn add_fault(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn calls(&self) -> &[PlatformCall] {
        &self.calls
    }

    pub fn mutation_calls(&self) -> usize {
        self.calls.iter().filter(|c| c.is_mutation()).count()
    }

    /// A finished task changed the inventory since the last `mark_clean`.
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Replace the inventory with a previously persisted copy.
    pub(crate) fn restore_inventory(&mut self, inventory: Inventory) {
        self.inventory = inventory;
        self.dirty = false;
    }

    fn now(&mut self) -> DateTime<Utc> {
        match self.clock {
            Some(t) => {
                self.clock = Some(t + Duration::seconds(1));
                t
            }
            None => Utc::now(),
        }
    }

    fn take_fault(&mut self, op: FaultOp, vm: &VmRef) -> Option<FaultKind> {
        let f = self.faults.iter_mut().find(|f| {
            f.op == op && f.times > 0 && f.vm.as_ref().map_or(true, |v| v == vm)
        })?;
        f.times -= 1;
        Some(f.kind.clone())
    }

    fn ensure_vm(&self, vm: &VmRef) -> Result<(), PlatformError> {
        match self.inventory.vm(vm) {
            Some(_) => Ok(()),
            None => Err(PlatformError::VmNotFound(vm.clone())),
        }
    }

    fn submit(&mut self, op: PendingOp, fault: Option<FaultKind>) -> TaskHandle {
        let handle = TaskHandle(format!("{TASK_REF_PREFIX}{}", self.next_task));
        self.next_task += 1;
        self.tasks.insert(
            handle.clone(),
            TaskEntry {
                op: Some(op),
                state: TaskState::Queued,
                fault,
            },
        );
        handle
    }

    fn apply(&mut self, op: PendingOp) -> Result<(), PlatformError> {
        match op {
            PendingOp::Create { vm, spec } => {
                let at = self.now();
                let id = self
                    .inventory
                    .take_snapshot(&vm, &spec.name, &spec.description, at)?;
                debug!("platform: vm {} snapshot '{}' created as {}", vm, spec.name, id);
            }
            PendingOp::Remove {
                vm,
                snapshot,
                remove_children,
            } => {
                self.inventory
                    .remove_snapshot(&vm, &snapshot, remove_children)?;
                debug!("platform: vm {} snapshot {} removed", vm, snapshot);
            }
        }
        self.dirty = true;
        Ok(())
    }
}

impl SnapshotService for MemoryPlatform {
    fn list_vms(&mut self) -> Result<Vec<VmInfo>, PlatformError> {
        self.calls.push(PlatformCall::ListVms);
        Ok(self.inventory.discover())
    }

    fn snapshot_tree(&mut self, vm: &VmRef) -> Result<Option<VmSnapshotInfo>, PlatformError> {
        self.calls.push(PlatformCall::ReadTree(vm.clone()));
        if let Some(kind) = self.take_fault(FaultOp::ReadTree, vm) {
            return Err(fault_error(kind));
        }
        let entry = self
            .inventory
            .vm(vm)
            .ok_or_else(|| PlatformError::VmNotFound(vm.clone()))?;
        Ok(entry.snapshot.clone())
    }

    fn create_snapshot(
        &mut self,
        vm: &VmRef,
        spec: &CreateSpec,
    ) -> Result<TaskHandle, PlatformError> {
        self.ensure_vm(vm)?;
        self.calls.push(PlatformCall::Create {
            vm: vm.clone(),
            name: spec.name.clone(),
            memory: spec.memory,
            quiesce: spec.quiesce,
        });
        let fault = self.take_fault(FaultOp::Create, vm);
        if let Some(FaultKind::Reject(msg)) = fault {
            return Err(PlatformError::TaskFailed(msg));
        }
        let op = PendingOp::Create {
            vm: vm.clone(),
            spec: spec.clone(),
        };
        Ok(self.submit(op, fault))
    }

    fn remove_snapshot(
        &mut self,
        vm: &VmRef,
        snapshot: &SnapshotRef,
        remove_children: bool,
    ) -> Result<TaskHandle, PlatformError> {
        self.ensure_vm(vm)?;
        self.calls.push(PlatformCall::Remove {
            vm: vm.clone(),
            snapshot: snapshot.clone(),
            remove_children,
        });
        let fault = self.take_fault(FaultOp::Remove, vm);
        if let Some(FaultKind::Reject(msg)) = fault {
            return Err(PlatformError::TaskFailed(msg));
        }
        let op = PendingOp::Remove {
            vm: vm.clone(),
            snapshot: snapshot.clone(),
            remove_children,
        };
        Ok(self.submit(op, fault))
    }

    fn task_state(&mut self, task: &TaskHandle) -> Result<TaskState, PlatformError> {
        let entry = self
            .tasks
            .get_mut(task)
            .ok_or_else(|| PlatformError::TaskNotFound(task.clone()))?;
        if entry.state.is_terminal() {
            return Ok(entry.state.clone());
        }
        if entry.fault == Some(FaultKind::Hang) {
            entry.state = TaskState::Running;
            return Ok(TaskState::Running);
        }

        let op = entry.op.take();
        let fault = entry.fault.take();
        let state = match (fault, op) {
            (Some(kind), _) => TaskState::Error(fault_error(kind)),
            (None, Some(op)) => match self.apply(op) {
                Ok(()) => TaskState::Success,
                Err(e) => TaskState::Error(e),
            },
            (None, None) => TaskState::Error(PlatformError::TaskFailed(
                "task has no pending operation".to_string(),
            )),
        };

        if let Some(entry) = self.tasks.get_mut(task) {
            entry.state = state.clone();
        }
        Ok(state)
    }
}

fn fault_error(kind: FaultKind) -> PlatformError {
    match kind {
        FaultKind::Reject(msg) | FaultKind::FailTask(msg) => PlatformError::TaskFailed(msg),
        FaultKind::Transient(msg) => PlatformError::Transient(msg),
        FaultKind::Hang => PlatformError::TaskFailed("task hung".to_string()),
    }
}
