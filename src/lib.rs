// Базовые модули
pub mod consts;
pub mod error;
pub mod config;
pub mod lock;

// Ядро ротации
pub mod snapshot; // src/snapshot/{mod,flatten}.rs
pub mod plan;     // src/plan.rs

// Граница с платформой и исполнитель
pub mod platform; // src/platform/{mod,inventory,memory,file}.rs
pub mod rotate;   // src/rotate/{mod,queue,task,summary}.rs

// Удобные реэкспорты
pub use config::RotatorConfig;
pub use error::{PlatformError, RotateError};
pub use plan::{plan, resolve_snapshot_name, Action, DeleteTarget, PlanOptions, RotationPlan};
pub use platform::{
    ConnectParams, FilePlatform, Inventory, MemoryPlatform, SnapshotService, VmInfo, VmRef,
};
pub use rotate::{Rotator, RunSummary};
pub use snapshot::{
    flatten, order_records, resolve, SnapshotNode, SnapshotOrder, SnapshotRecord, SnapshotRef,
};
