//! Run summary: confirmed successes and failures, per run and per VM.

use serde::Serialize;
use std::fmt;

use crate::plan::RotationPlan;
use crate::platform::VmRef;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VmReport {
    pub vm: VmRef,
    pub name: String,
    pub plan: Option<RotationPlan>,
    pub created: bool,
    pub deleted: usize,
    pub delete_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters only include confirmed outcomes. In dry-run, planned actions
/// count as done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub vms_seen: usize,
    pub vms_rotated: usize,
    pub vms_failed: usize,
    pub created: usize,
    pub deleted: usize,
    pub create_failed: usize,
    pub delete_failed: usize,
    pub vms: Vec<VmReport>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.vms_failed > 0 || self.create_failed > 0 || self.delete_failed > 0
    }

    pub fn report_mut(&mut self, vm: &VmRef) -> Option<&mut VmReport> {
        self.vms.iter_mut().find(|r| &r.vm == vm)
    }

    pub fn report(&self, vm: &VmRef) -> Option<&VmReport> {
        self.vms.iter().find(|r| &r.vm == vm)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "done rotating snapshots, {} created, {} deleted",
            self.created, self.deleted
        )?;
        if self.has_failures() {
            write!(
                f,
                " ({} vm(s) failed, {} create(s) failed, {} delete(s) failed)",
                self.vms_failed, self.create_failed, self.delete_failed
            )?;
        }
        if self.dry_run {
            f.write_str(" [dry-run]")?;
        }
        Ok(())
    }
}
