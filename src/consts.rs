//! Общие константы: значения по умолчанию, форматы имён, ENV-ключи.

// -------- Retention --------
pub const DEFAULT_KEEP: u32 = 3;
pub const DEFAULT_DESCRIPTION: &str = "Automatic snapshot taken by snapshot rotator tool";

// -------- Snapshot names --------
// Дата: "2024-01-04"; при коллизии — метка с точностью до секунды: "2024-01-04T13:05:09".
pub const DATE_LABEL_FMT: &str = "%Y-%m-%d";
pub const TIMESTAMP_LABEL_FMT: &str = "%Y-%m-%dT%H:%M:%S";

// -------- Platform tasks --------
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_RETRIES: u32 = 0;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 2_000;
// Верхняя граница одной паузы между повторами
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

// -------- Connection --------
pub const DEFAULT_PORT: u16 = 443;

// -------- Inventory file --------
pub const INVENTORY_TMP_SUFFIX: &str = "tmp";
pub const INVENTORY_LOCK_SUFFIX: &str = "lock";
pub const SNAPSHOT_REF_PREFIX: &str = "snapshot-";
pub const TASK_REF_PREFIX: &str = "task-";

// -------- ENV --------
pub const ENV_KEEP: &str = "SNAPROT_KEEP";
pub const ENV_PRUNE_ONLY: &str = "SNAPROT_PRUNE_ONLY";
pub const ENV_DRY_RUN: &str = "SNAPROT_DRY_RUN";
pub const ENV_TAG: &str = "SNAPROT_TAG";
pub const ENV_DESCRIPTION: &str = "SNAPROT_DESCRIPTION";
pub const ENV_ORDER: &str = "SNAPROT_ORDER";
pub const ENV_TASK_TIMEOUT_MS: &str = "SNAPROT_TASK_TIMEOUT_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "SNAPROT_POLL_INTERVAL_MS";
pub const ENV_RETRIES: &str = "SNAPROT_RETRIES";
pub const ENV_RETRY_BACKOFF_MS: &str = "SNAPROT_RETRY_BACKOFF_MS";
