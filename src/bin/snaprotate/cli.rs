use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use snaprotate::consts::DEFAULT_PORT;
use snaprotate::SnapshotOrder;

/// CLI ротатора снапшотов VM
#[derive(Parser, Debug)]
#[command(
    name = "snaprotate",
    version,
    about = "Create a dated snapshot per VM and prune old ones down to a retention count",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Verbosity: -v info, -vv debug (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Create today's snapshot and delete the oldest ones beyond --keep
    ///
    /// Пример:
    ///   snaprotate rotate -s vc.lab -u admin --inventory ./inventory.json -k 3 -v
    ///   snaprotate rotate -s vc.lab -u admin --inventory ./inventory.json --prune-only --dry-run
    ///
    /// Все create выполняются до любых delete: удаления копятся в общей
    /// очереди и выполняются после обхода всех VM.
    Rotate(RotateArgs),
    /// List VMs and their snapshots (oldest first), read-only
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnArgs {
    /// Remote host to connect to
    #[arg(short = 's', long)]
    pub host: String,
    /// Port to connect on
    #[arg(short = 'o', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// User name to use when connecting to host
    #[arg(short, long)]
    pub user: String,
    /// Password; prompted for when omitted
    #[arg(short, long)]
    pub password: Option<String>,
    /// Inventory document of the platform endpoint
    #[arg(long)]
    pub inventory: PathBuf,
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    /// How many snapshots to keep (default 3, or SNAPROT_KEEP)
    #[arg(short, long)]
    pub keep: Option<u32>,
    /// Suffix appended to the snapshot name
    #[arg(short, long)]
    pub tag: Option<String>,
    /// Description of created snapshots
    #[arg(short, long)]
    pub description: Option<String>,
    /// Only delete old snapshots, never create
    #[arg(long, default_value_t = false)]
    pub prune_only: bool,
    /// Log the plan without changing anything
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Rotate only VMs with this name (repeatable)
    #[arg(long = "vm")]
    pub vms: Vec<String>,
    /// Ordering of snapshots before pruning: traversal|create-time
    #[arg(long)]
    pub order: Option<SnapshotOrder>,
    /// Upper bound for a single platform task wait, ms
    #[arg(long)]
    pub task_timeout_ms: Option<u64>,
    /// Extra attempts for transient task failures
    #[arg(long)]
    pub retries: Option<u32>,
    /// Base backoff between attempts, ms (doubled per attempt)
    #[arg(long)]
    pub retry_backoff_ms: Option<u64>,
    /// JSON summary instead of the summary line
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    /// Only VMs with this name (repeatable)
    #[arg(long = "vm")]
    pub vms: Vec<String>,
    /// Ordering of snapshots: traversal|create-time
    #[arg(long)]
    pub order: Option<SnapshotOrder>,
    /// JSON output
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
