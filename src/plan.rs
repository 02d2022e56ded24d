//! Rotation planner: flattened snapshots + retention count -> RotationPlan.
//!
//! Правила (n = число снапшотов, index 0 = самый старый):
//! - n <  keep: create;
//! - n == keep: create + delete[0];
//! - n >  keep: create + delete[0 .. n-(keep-1)].
//! Prune-only убирает create, удаления не меняются. keep = 0 допустим:
//! число удалений ограничено n (новый снапшот никогда не кандидат).
//!
//! План строится один раз на VM из одного чтения дерева и больше не
//! пересчитывается; удаления адресуют узлы по SnapshotRef, а не по имени.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::consts::{DATE_LABEL_FMT, DEFAULT_DESCRIPTION, DEFAULT_KEEP, TIMESTAMP_LABEL_FMT};
use crate::snapshot::{SnapshotPath, SnapshotRecord, SnapshotRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub keep: u32,
    pub prune_only: bool,
    pub tag: Option<String>,
    pub description: Option<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            keep: DEFAULT_KEEP,
            prune_only: false,
            tag: None,
            description: None,
        }
    }
}

/// Snapshot selected for deletion, identified by its platform reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteTarget {
    pub id: SnapshotRef,
    pub name: String,
    pub create_time: DateTime<Utc>,
    pub path: SnapshotPath,
}

impl DeleteTarget {
    fn from_record(r: &SnapshotRecord) -> Self {
        Self {
            id: r.id.clone(),
            name: r.name.clone(),
            create_time: r.create_time,
            path: r.path.clone(),
        }
    }
}

impl fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({}, {})", self.name, self.id, self.create_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Create { name: String, description: String },
    Delete(DeleteTarget),
}

/// Ordered actions for one VM: at most one Create, then Deletes oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationPlan {
    pub snapshots_found: usize,
    pub keep: u32,
    pub actions: Vec<Action>,
}

impl RotationPlan {
    /// (name, description) of the planned snapshot, if any.
    pub fn create(&self) -> Option<(&str, &str)> {
        self.actions.iter().find_map(|a| match a {
            Action::Create { name, description } => Some((name.as_str(), description.as_str())),
            Action::Delete(_) => None,
        })
    }

    pub fn deletes(&self) -> impl Iterator<Item = &DeleteTarget> {
        self.actions.iter().filter_map(|a| match a {
            Action::Delete(t) => Some(t),
            Action::Create { .. } => None,
        })
    }

    pub fn delete_count(&self) -> usize {
        self.deletes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Human-readable decision, e.g. "3 snapshots found, should create a
    /// snapshot and delete oldest one".
    pub fn describe(&self) -> String {
        let n = self.snapshots_found;
        let create = self.create().is_some();
        let deletes = self.delete_count();
        match (create, deletes) {
            (false, 0) => format!("{n} snapshots found, nothing to do"),
            (true, 0) => format!("{n} snapshots found, should create a snapshot"),
            (true, 1) => {
                format!("{n} snapshots found, should create a snapshot and delete oldest one")
            }
            (true, d) => format!(
                "{n} snapshots found, should create a snapshot and delete {d} (keeping {})",
                n - d
            ),
            (false, 1) => format!("{n} snapshots found, should delete oldest one"),
            (false, d) => format!("{n} snapshots found, should delete {d} (keeping {})", n - d),
        }
    }
}

/// Number of existing snapshots to delete so that `keep` remain after the
/// new one is added. Never exceeds `n`.
pub fn deletion_count(n: usize, keep: u32) -> usize {
    (n + 1).saturating_sub(keep as usize).min(n)
}

/// Name for today's snapshot that collides with no existing name.
///
/// The bare date label ("2024-01-04") decides escalation: if it is taken,
/// the second-precision timestamp is used instead. The tag, when present,
/// is appended after a space to whichever label was chosen. A tagged name
/// that is still taken escalates the same way, then gets `-1`, `-2`, ...
pub fn resolve_snapshot_name(
    records: &[SnapshotRecord],
    tag: Option<&str>,
    now: NaiveDateTime,
) -> String {
    let taken: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
    let tagged = |base: &str| match tag {
        Some(t) if !t.is_empty() => format!("{base} {t}"),
        _ => base.to_string(),
    };
    // свободна и голая метка, и итоговое имя с тегом
    let free = |base: &str| !taken.contains(base) && !taken.contains(tagged(base).as_str());

    let date = now.format(DATE_LABEL_FMT).to_string();
    if free(&date) {
        return tagged(&date);
    }

    let ts = now.format(TIMESTAMP_LABEL_FMT).to_string();
    if free(&ts) {
        return tagged(&ts);
    }

    let mut i = 1u32;
    loop {
        let base = format!("{ts}-{i}");
        if free(&base) {
            return tagged(&base);
        }
        i += 1;
    }
}

/// Build the plan for one VM. `records` must already be ordered oldest
/// first (see `snapshot::order_records`).
pub fn plan(records: &[SnapshotRecord], opts: &PlanOptions, now: NaiveDateTime) -> RotationPlan {
    let n = records.len();
    let mut actions = Vec::new();

    if !opts.prune_only {
        let name = resolve_snapshot_name(records, opts.tag.as_deref(), now);
        let description = opts
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        actions.push(Action::Create { name, description });
    }

    let to_delete = deletion_count(n, opts.keep);
    actions.extend(
        records
            .iter()
            .take(to_delete)
            .map(|r| Action::Delete(DeleteTarget::from_record(r))),
    );

    RotationPlan {
        snapshots_found: n,
        keep: opts.keep,
        actions,
    }
}
