//! rotate — executor of rotation plans across the whole inventory.
//!
//! Порядок:
//! 1) VM за VM: чтение дерева -> flatten -> сортировка -> план -> create;
//!    удаления VM уходят в глобальную очередь.
//! 2) После обхода всех VM очередь удалений разбирается последовательно.
//!
//! Ошибки отдельной VM или отдельного действия логируются и считаются, но не
//! прерывают прогон. Если create для VM не удался, её удаления в очередь не
//! попадают.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::{debug, error, info, warn};

use crate::config::RotatorConfig;
use crate::error::RotateError;
use crate::plan::{plan, RotationPlan};
use crate::platform::{CreateSpec, SnapshotService, VmInfo, VmRef};
use crate::snapshot::{flatten, order_records, resolve, SnapshotRecord};

mod queue;
mod summary;
mod task;

pub use queue::{DeletionQueue, PendingDelete};
pub use summary::{RunSummary, VmReport};
pub use task::{wait_for_task, TaskPolicy};

pub struct Rotator<'a, S: SnapshotService> {
    service: &'a mut S,
    cfg: RotatorConfig,
    policy: TaskPolicy,
    now: NaiveDateTime,
    queue: DeletionQueue,
    summary: RunSummary,
}

impl<'a, S: SnapshotService> Rotator<'a, S> {
    pub fn new(service: &'a mut S, cfg: RotatorConfig) -> Self {
        let policy = TaskPolicy::from_config(&cfg);
        let summary = RunSummary {
            dry_run: cfg.dry_run,
            ..RunSummary::default()
        };
        Self {
            service,
            cfg,
            policy,
            now: Local::now().naive_local(),
            queue: DeletionQueue::new(),
            summary,
        }
    }

    /// Override the clock used for snapshot names.
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    /// Rotate every selected VM. Only the initial VM listing can fail the run.
    pub fn run(mut self) -> Result<RunSummary> {
        for w in self.cfg.validate() {
            warn!("config: {}", w);
        }
        debug!("{}", self.cfg);

        let vms = self.service.list_vms().context("list VMs")?;
        debug!("{} VMs discovered", vms.len());

        for vm in &vms {
            if !self.cfg.selects_vm(&vm.name) {
                debug!("skipping vm '{}' (not selected)", vm.name);
                continue;
            }
            self.summary.vms_seen += 1;
            self.summary.vms.push(VmReport {
                vm: vm.id.clone(),
                name: vm.name.clone(),
                ..VmReport::default()
            });

            match self.rotate_vm(vm) {
                Ok(()) => self.summary.vms_rotated += 1,
                Err(e) => {
                    self.summary.vms_failed += 1;
                    error!("vm '{}' ({}): {:#}", vm.name, vm.id, e);
                    if let Some(r) = self.summary.report_mut(&vm.id) {
                        r.error = Some(format!("{e:#}"));
                    }
                }
            }
        }

        self.drain_deletions();
        info!("{}", self.summary);
        Ok(self.summary)
    }

    fn rotate_vm(&mut self, vm: &VmInfo) -> Result<()> {
        log_vm(vm);

        let tree = self
            .service
            .snapshot_tree(&vm.id)
            .with_context(|| format!("read snapshot tree of vm '{}'", vm.name))?;
        let roots = tree.map(|t| t.roots).unwrap_or_default();
        let records = order_records(flatten(&roots), self.cfg.order);
        for r in &records {
            log_record(r);
        }

        let plan = plan(&records, &self.cfg.plan_options(), self.now);
        info!("{}", plan.describe());
        if let Some(r) = self.summary.report_mut(&vm.id) {
            r.plan = Some(plan.clone());
        }

        if let Some((name, description)) = plan.create() {
            if let Err(e) = self.execute_create(vm, name, description) {
                self.summary.create_failed += 1;
                if plan.delete_count() > 0 {
                    warn!(
                        "vm '{}': create failed, {} planned deletion(s) dropped",
                        vm.name,
                        plan.delete_count()
                    );
                }
                return Err(anyhow::Error::new(e)
                    .context(format!("create snapshot '{}' of vm '{}'", name, vm.name)));
            }
            self.summary.created += 1;
            if let Some(r) = self.summary.report_mut(&vm.id) {
                r.created = true;
            }
        }

        self.enqueue_deletions(vm, &plan);
        Ok(())
    }

    fn enqueue_deletions(&mut self, vm: &VmInfo, plan: &RotationPlan) {
        for t in plan.deletes() {
            debug!("vm '{}': queue deletion of snapshot {}", vm.name, t);
        }
        self.queue.enqueue(&vm.id, &vm.name, plan.deletes());
    }

    fn execute_create(
        &mut self,
        vm: &VmInfo,
        name: &str,
        description: &str,
    ) -> Result<(), RotateError> {
        if self.cfg.dry_run {
            info!("[dry-run] would create snapshot '{}' of vm '{}'", name, vm.name);
            return Ok(());
        }
        debug!("creating snapshot of VM '{}' using name '{}'", vm.name, name);

        let spec = CreateSpec::new(name, description);
        let mut attempt = 0u32;
        loop {
            let res = match self.service.create_snapshot(&vm.id, &spec) {
                Ok(task) => wait_for_task(&mut *self.service, &task, &self.policy),
                Err(e) => Err(e),
            };
            match res {
                Ok(()) => {
                    info!("vm '{}': snapshot '{}' created", vm.name, name);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.policy.retries => {
                    let delay = self.policy.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "vm '{}': create '{}' failed ({}), retry {}/{} in {:?}",
                        vm.name, name, e, attempt, self.policy.retries, delay
                    );
                    std::thread::sleep(delay);
                    // create не идемпотентен: перед повтором смотрим, не появился ли снапшот
                    if self.has_snapshot_named(&vm.id, name)? {
                        info!("vm '{}': snapshot '{}' already present, not retrying", vm.name, name);
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn has_snapshot_named(&mut self, vm: &VmRef, name: &str) -> Result<bool, RotateError> {
        let tree = self.service.snapshot_tree(vm)?;
        let roots = tree.map(|t| t.roots).unwrap_or_default();
        Ok(flatten(&roots).iter().any(|r| r.name == name))
    }

    fn drain_deletions(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        info!("executing {} queued deletion(s)", self.queue.len());

        while let Some(p) = self.queue.pop() {
            let outcome = self.execute_delete(&p);
            let report = self.summary.report_mut(&p.vm);
            match outcome {
                Ok(()) => {
                    if let Some(r) = report {
                        r.deleted += 1;
                    }
                    self.summary.deleted += 1;
                }
                Err(e) => {
                    if let Some(r) = report {
                        r.delete_failed += 1;
                    }
                    self.summary.delete_failed += 1;
                    error!("vm '{}': delete snapshot {}: {}", p.vm_name, p.target, e);
                }
            }
        }
    }

    fn execute_delete(&mut self, p: &PendingDelete) -> Result<(), RotateError> {
        if self.cfg.dry_run {
            info!(
                "[dry-run] would delete snapshot {} of vm '{}'",
                p.target, p.vm_name
            );
            return Ok(());
        }

        let mut attempt = 0u32;
        loop {
            // Ссылка проверяется по текущему дереву перед каждой попыткой.
            let tree = self.service.snapshot_tree(&p.vm)?;
            let roots = tree.map(|t| t.roots).unwrap_or_default();
            let path = match resolve(&p.vm, &roots, &p.target.id) {
                Ok(path) => path,
                Err(RotateError::SnapshotNotFound { .. }) if attempt > 0 => {
                    info!(
                        "vm '{}': snapshot {} is gone after a failed attempt, counting as deleted",
                        p.vm_name, p.target
                    );
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            debug!("deleting snapshot {} (tree position {})", p.target, path);

            let res = match self.service.remove_snapshot(&p.vm, &p.target.id, false) {
                Ok(task) => wait_for_task(&mut *self.service, &task, &self.policy),
                Err(e) => Err(e),
            };
            match res {
                Ok(()) => {
                    info!("vm '{}': snapshot {} deleted", p.vm_name, p.target);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.policy.retries => {
                    let delay = self.policy.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "vm '{}': delete {} failed ({}), retry {}/{} in {:?}",
                        p.vm_name, p.target, e, attempt, self.policy.retries, delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn log_vm(vm: &VmInfo) {
    info!("Name       : {}", vm.name);
    debug!("Path       : {}", vm.path);
    debug!("Guest      : {}", vm.guest);
    if let Some(a) = vm.annotation.as_deref().filter(|a| !a.is_empty()) {
        debug!("Annotation : {}", a);
    }
    debug!("State      : {}", vm.power_state);
    if let Some(ip) = vm.ip.as_deref().filter(|ip| !ip.is_empty()) {
        debug!("IP         : {}", ip);
    }
    if let Some(q) = vm.question.as_deref() {
        debug!("Question   : {}", q);
    }
    if !vm.tools_running {
        debug!("tools not running");
    }
}

fn log_record(r: &SnapshotRecord) {
    debug!(
        "Name: {}; Description: {}; CreateTime: {}; State: {}",
        r.name, r.description, r.create_time, r.state
    );
}
