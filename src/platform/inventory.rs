//! Inventory document: folders, datacenters, VMs and their snapshot trees.
//!
//! Формат (JSON):
//! {
//!   "endpoint": {"host": "vc.lab", "port": 443},
//!   "accounts": [{"user": "admin", "password": "secret"}],
//!   "root": {"name": "root", "children": [
//!     {"datacenter": {"name": "dc1", "vm_folder": {"name": "vm", "children": [
//!       {"vm": {"id": "vm-1", "name": "docker", "snapshot": {"roots": [...], "current": "snapshot-3"}}}
//!     ]}}}
//!   ]},
//!   "next_ref": 4
//! }
//!
//! Обход — явным стеком; порядок VM = pre-order порядок в документе.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{VmInfo, VmRef, VmSnapshotInfo};
use crate::consts::{DEFAULT_PORT, SNAPSHOT_REF_PREFIX};
use crate::error::PlatformError;
use crate::snapshot::{
    flatten, node_at_mut, siblings_mut, SnapshotNode, SnapshotRef, SnapshotState,
};

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub children: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datacenter {
    pub name: String,
    pub vm_folder: Folder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmEntry {
    #[serde(flatten)]
    pub info: VmInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<VmSnapshotInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Folder(Folder),
    Datacenter(Datacenter),
    Vm(VmEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub endpoint: Endpoint,
    #[serde(default)]
    pub accounts: Vec<Account>,
    pub root: Folder,
    /// Next numeric suffix for `snapshot-N` references.
    #[serde(default)]
    pub next_ref: u64,
}

impl Inventory {
    pub fn new<H: Into<String>>(host: H) -> Self {
        Self {
            endpoint: Endpoint {
                host: host.into(),
                port: DEFAULT_PORT,
            },
            accounts: Vec::new(),
            root: Folder {
                name: "root".to_string(),
                children: Vec::new(),
            },
            next_ref: 1,
        }
    }

    pub fn with_account<U: Into<String>, P: Into<String>>(mut self, user: U, password: P) -> Self {
        self.accounts.push(Account {
            user: user.into(),
            password: password.into(),
        });
        self
    }

    /// Append a datacenter (with an empty vm folder) under the root folder.
    pub fn add_datacenter<S: Into<String>>(&mut self, name: S) -> &mut Folder {
        self.root.children.push(Entity::Datacenter(Datacenter {
            name: name.into(),
            vm_folder: Folder {
                name: "vm".to_string(),
                children: Vec::new(),
            },
        }));
        match self.root.children.last_mut() {
            Some(Entity::Datacenter(dc)) => &mut dc.vm_folder,
            _ => unreachable!("datacenter was just pushed"),
        }
    }

    /// Bump `next_ref` past every numeric `snapshot-N` already present, so
    /// hand-edited documents never get a duplicate reference.
    pub fn normalize(&mut self) {
        let mut max_seen = 0u64;
        for vm in self.vm_entries() {
            if let Some(info) = &vm.snapshot {
                for rec in flatten(&info.roots) {
                    if let Some(n) = rec
                        .id
                        .as_str()
                        .strip_prefix(SNAPSHOT_REF_PREFIX)
                        .and_then(|s| s.parse::<u64>().ok())
                    {
                        max_seen = max_seen.max(n);
                    }
                }
            }
        }
        self.next_ref = self.next_ref.max(max_seen + 1).max(1);
    }

    pub fn allocate_ref(&mut self) -> SnapshotRef {
        let n = self.next_ref.max(1);
        self.next_ref = n + 1;
        SnapshotRef(format!("{SNAPSHOT_REF_PREFIX}{n}"))
    }

    /// VMs in walk order, with `location` filled in.
    pub fn discover(&self) -> Vec<VmInfo> {
        let mut out = Vec::new();
        let mut stack: Vec<(&Entity, String)> = self
            .root
            .children
            .iter()
            .rev()
            .map(|e| (e, String::new()))
            .collect();

        while let Some((entity, location)) = stack.pop() {
            match entity {
                Entity::Vm(vm) => {
                    let mut info = vm.info.clone();
                    info.location = location;
                    out.push(info);
                }
                Entity::Folder(f) => {
                    let loc = join_location(&location, &f.name);
                    for child in f.children.iter().rev() {
                        stack.push((child, loc.clone()));
                    }
                }
                Entity::Datacenter(dc) => {
                    let loc = join_location(
                        &join_location(&location, &dc.name),
                        &dc.vm_folder.name,
                    );
                    for child in dc.vm_folder.children.iter().rev() {
                        stack.push((child, loc.clone()));
                    }
                }
            }
        }
        out
    }

    fn vm_entries(&self) -> Vec<&VmEntry> {
        let mut out = Vec::new();
        let mut stack: Vec<&Folder> = vec![&self.root];
        while let Some(folder) = stack.pop() {
            for child in &folder.children {
                match child {
                    Entity::Vm(vm) => out.push(vm),
                    Entity::Folder(f) => stack.push(f),
                    Entity::Datacenter(dc) => stack.push(&dc.vm_folder),
                }
            }
        }
        out
    }

    pub fn vm(&self, id: &VmRef) -> Option<&VmEntry> {
        self.vm_entries().into_iter().find(|vm| &vm.info.id == id)
    }

    pub fn vm_mut(&mut self, id: &VmRef) -> Option<&mut VmEntry> {
        let mut stack: Vec<&mut Folder> = vec![&mut self.root];
        while let Some(folder) = stack.pop() {
            for child in folder.children.iter_mut() {
                match child {
                    Entity::Vm(vm) if vm.info.id == *id => return Some(vm),
                    Entity::Vm(_) => {}
                    Entity::Folder(f) => stack.push(f),
                    Entity::Datacenter(dc) => stack.push(&mut dc.vm_folder),
                }
            }
        }
        None
    }

    /// Take a snapshot of `vm`: a new node under the current snapshot (or a
    /// new root when the VM has none), which then becomes current.
    pub fn take_snapshot(
        &mut self,
        vm: &VmRef,
        name: &str,
        description: &str,
        create_time: DateTime<Utc>,
    ) -> Result<SnapshotRef, PlatformError> {
        if self.vm(vm).is_none() {
            return Err(PlatformError::VmNotFound(vm.clone()));
        }
        let id = self.allocate_ref();
        let entry = self
            .vm_mut(vm)
            .ok_or_else(|| PlatformError::VmNotFound(vm.clone()))?;

        let mut node = SnapshotNode::new(id.clone(), name, create_time).with_description(description);
        node.state = match entry.info.power_state {
            super::PowerState::PoweredOn => SnapshotState::PoweredOn,
            super::PowerState::PoweredOff => SnapshotState::PoweredOff,
            super::PowerState::Suspended => SnapshotState::Suspended,
        };

        let tree = entry.snapshot.get_or_insert_with(VmSnapshotInfo::default);
        let parent = tree.current.as_ref().and_then(|cur| {
            flatten(&tree.roots)
                .into_iter()
                .find(|r| &r.id == cur)
                .map(|r| r.path)
        });
        let parent_node = match parent {
            Some(p) => node_at_mut(&mut tree.roots, &p),
            None => None,
        };
        match parent_node {
            Some(parent) => parent.children.push(node),
            None => tree.roots.push(node),
        }
        tree.current = Some(id.clone());
        Ok(id)
    }

    /// Remove exactly the node `snapshot` from the tree of `vm`.
    ///
    /// With `remove_children == false` the node's children take its place
    /// among its siblings. If the removed subtree held the current snapshot,
    /// the parent (or nothing) becomes current.
    pub fn remove_snapshot(
        &mut self,
        vm: &VmRef,
        snapshot: &SnapshotRef,
        remove_children: bool,
    ) -> Result<(), PlatformError> {
        let entry = self
            .vm_mut(vm)
            .ok_or_else(|| PlatformError::VmNotFound(vm.clone()))?;
        let not_found = || PlatformError::SnapshotNotFound {
            vm: vm.clone(),
            snapshot: snapshot.clone(),
        };
        let tree = entry.snapshot.as_mut().ok_or_else(not_found)?;

        let records = flatten(&tree.roots);
        let path = records
            .iter()
            .find(|r| &r.id == snapshot)
            .map(|r| r.path.clone())
            .ok_or_else(not_found)?;
        let parent_id = path
            .parent()
            .and_then(|p| records.iter().find(|r| r.path == p).map(|r| r.id.clone()));

        let idx = path.last_index().ok_or_else(not_found)?;
        let siblings = siblings_mut(&mut tree.roots, &path).ok_or_else(not_found)?;
        let removed = siblings.remove(idx);

        let mut subtree_ids = Vec::new();
        if remove_children {
            subtree_ids = flatten(std::slice::from_ref(&removed))
                .into_iter()
                .map(|r| r.id)
                .collect();
        } else {
            subtree_ids.push(removed.id.clone());
            // Дети занимают место удалённого узла, порядок сохраняется.
            for (offset, child) in removed.children.into_iter().enumerate() {
                siblings.insert(idx + offset, child);
            }
        }

        if let Some(cur) = &tree.current {
            if subtree_ids.contains(cur) {
                tree.current = parent_id;
            }
        }
        if tree.roots.is_empty() {
            entry.snapshot = None;
        }
        Ok(())
    }
}

fn join_location(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}
