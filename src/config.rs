//! Centralized configuration and builder for the rotator.
//!
//! Goals:
//! - Single place to collect tunables instead of reading flags from nested helpers.
//! - RotatorConfig::from_env() reads SNAPROT_* variables; CLI flags override them
//!   through the fluent `with_*` setters.
//! - Planner and executor receive the config explicitly (no globals).
//!
//! Defaults follow the classic rotator behaviour:
//! - keep = 3, description = "Automatic snapshot taken by snapshot rotator tool"
//! - snapshots ordered by create time (stable), oldest first
//! - no retries; per-task wait bounded by task_timeout_ms

use std::fmt;
use std::time::Duration;

use crate::consts::{
    DEFAULT_DESCRIPTION, DEFAULT_KEEP, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RETRIES,
    DEFAULT_RETRY_BACKOFF_MS, DEFAULT_TASK_TIMEOUT_MS, ENV_DESCRIPTION, ENV_DRY_RUN, ENV_KEEP,
    ENV_ORDER, ENV_POLL_INTERVAL_MS, ENV_PRUNE_ONLY, ENV_RETRIES, ENV_RETRY_BACKOFF_MS, ENV_TAG,
    ENV_TASK_TIMEOUT_MS,
};
use crate::plan::PlanOptions;
use crate::snapshot::SnapshotOrder;

/// Top-level configuration of a rotation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotatorConfig {
    /// Snapshots that should exist per VM after rotation.
    /// Env: SNAPROT_KEEP (default 3). 0 is accepted: every existing snapshot is pruned.
    pub keep: u32,

    /// Only delete, never create.
    /// Env: SNAPROT_PRUNE_ONLY = 0|1|true|false (default false)
    pub prune_only: bool,

    /// Plan and log, but never mutate the platform.
    /// Env: SNAPROT_DRY_RUN (default false)
    pub dry_run: bool,

    /// Optional suffix appended (space separated) to the snapshot name.
    /// Env: SNAPROT_TAG
    pub tag: Option<String>,

    /// Description of created snapshots; None means the default text.
    /// Env: SNAPROT_DESCRIPTION
    pub description: Option<String>,

    /// Ordering of the flattened list before planning.
    /// Env: SNAPROT_ORDER = traversal|create-time (default create-time)
    pub order: SnapshotOrder,

    /// VM names to rotate; empty = every VM.
    pub vm_filter: Vec<String>,

    /// Upper bound for one platform task wait.
    /// Env: SNAPROT_TASK_TIMEOUT_MS (default 30 min)
    pub task_timeout_ms: u64,

    /// Task polling interval.
    /// Env: SNAPROT_POLL_INTERVAL_MS (default 500)
    pub poll_interval_ms: u64,

    /// Extra attempts for transient task failures.
    /// Env: SNAPROT_RETRIES (default 0)
    pub retries: u32,

    /// Base backoff between attempts, doubled per attempt.
    /// Env: SNAPROT_RETRY_BACKOFF_MS (default 2000)
    pub retry_backoff_ms: u64,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            keep: DEFAULT_KEEP,
            prune_only: false,
            dry_run: false,
            tag: None,
            description: None,
            order: SnapshotOrder::default(),
            vm_filter: Vec::new(),
            task_timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retries: DEFAULT_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    let s = v.trim().to_ascii_lowercase();
    Some(s == "1" || s == "true" || s == "on" || s == "yes")
}

fn env_num<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse::<T>().ok()
}

fn env_str(key: &str) -> Option<String> {
    let v = std::env::var(key).ok()?;
    let s = v.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl RotatorConfig {
    /// Load configuration from SNAPROT_* environment variables.
    /// Unparsable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = env_num::<u32>(ENV_KEEP) {
            cfg.keep = n;
        }
        if let Some(on) = env_flag(ENV_PRUNE_ONLY) {
            cfg.prune_only = on;
        }
        if let Some(on) = env_flag(ENV_DRY_RUN) {
            cfg.dry_run = on;
        }
        if let Some(s) = env_str(ENV_TAG) {
            cfg.tag = Some(s);
        }
        if let Some(s) = env_str(ENV_DESCRIPTION) {
            cfg.description = Some(s);
        }
        if let Some(order) = env_str(ENV_ORDER).and_then(|s| s.parse::<SnapshotOrder>().ok()) {
            cfg.order = order;
        }
        if let Some(n) = env_num::<u64>(ENV_TASK_TIMEOUT_MS) {
            cfg.task_timeout_ms = n;
        }
        if let Some(n) = env_num::<u64>(ENV_POLL_INTERVAL_MS) {
            cfg.poll_interval_ms = n;
        }
        if let Some(n) = env_num::<u32>(ENV_RETRIES) {
            cfg.retries = n;
        }
        if let Some(n) = env_num::<u64>(ENV_RETRY_BACKOFF_MS) {
            cfg.retry_backoff_ms = n;
        }

        cfg
    }

    pub fn with_keep(mut self, keep: u32) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_prune_only(mut self, on: bool) -> Self {
        self.prune_only = on;
        self
    }

    pub fn with_dry_run(mut self, on: bool) -> Self {
        self.dry_run = on;
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: Option<S>) -> Self {
        self.tag = tag.map(|s| s.into()).filter(|s: &String| !s.trim().is_empty());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, d: Option<S>) -> Self {
        self.description = d.map(Into::into);
        self
    }

    pub fn with_order(mut self, order: SnapshotOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_vm_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vm_filter = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_task_timeout_ms(mut self, ms: u64) -> Self {
        self.task_timeout_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_retries(mut self, n: u32) -> Self {
        self.retries = n;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }

    /// Non-fatal configuration warnings (to be logged by the caller).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.keep < 1 {
            warnings.push(
                "keep < 1: every existing snapshot will be deleted on each run".to_string(),
            );
        }
        if self.task_timeout_ms == 0 {
            warnings.push("task_timeout_ms = 0: every platform task will time out".to_string());
        }
        if self.poll_interval_ms == 0 {
            warnings.push("poll_interval_ms = 0: task polling will spin".to_string());
        }
        warnings
    }

    /// Whether `name` passes the VM filter.
    pub fn selects_vm(&self, name: &str) -> bool {
        self.vm_filter.is_empty() || self.vm_filter.iter().any(|n| n == name)
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            keep: self.keep,
            prune_only: self.prune_only,
            tag: self.tag.clone(),
            description: self.description.clone(),
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn description_or_default(&self) -> &str {
        self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION)
    }
}

impl fmt::Display for RotatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RotatorConfig {{ \
             keep: {}, \
             prune_only: {}, \
             dry_run: {}, \
             tag: {}, \
             description: {}, \
             order: {}, \
             vms: {}, \
             task_timeout_ms: {}, \
             poll_interval_ms: {}, \
             retries: {}, \
             retry_backoff_ms: {} \
             }}",
            self.keep,
            self.prune_only,
            self.dry_run,
            self.tag.as_deref().unwrap_or("(none)"),
            self.description_or_default(),
            self.order,
            if self.vm_filter.is_empty() {
                "all".to_string()
            } else {
                self.vm_filter.join(",")
            },
            self.task_timeout_ms,
            self.poll_interval_ms,
            self.retries,
            self.retry_backoff_ms,
        )
    }
}
