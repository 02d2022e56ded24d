//! Global deletion queue: filled during the VM pass, drained after it.

use std::collections::VecDeque;

use crate::plan::DeleteTarget;
use crate::platform::VmRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub vm: VmRef,
    pub vm_name: String,
    pub target: DeleteTarget,
}

/// FIFO of deletions; VMs in visit order, each VM's targets oldest first.
#[derive(Debug, Default)]
pub struct DeletionQueue {
    items: VecDeque<PendingDelete>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue<'a, I>(&mut self, vm: &VmRef, vm_name: &str, targets: I)
    where
        I: IntoIterator<Item = &'a DeleteTarget>,
    {
        for t in targets {
            self.items.push_back(PendingDelete {
                vm: vm.clone(),
                vm_name: vm_name.to_string(),
                target: t.clone(),
            });
        }
    }

    pub fn pop(&mut self) -> Option<PendingDelete> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
