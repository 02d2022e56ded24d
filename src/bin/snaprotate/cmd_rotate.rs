use anyhow::{Context, Result};

use snaprotate::{FilePlatform, Rotator, RotatorConfig};

use crate::cli::RotateArgs;
use crate::util::connect_params;

/// Rotate snapshots of every selected VM and print the summary.
pub fn exec(args: RotateArgs) -> Result<()> {
    let params = connect_params(&args.conn)?;

    // ENV -> флаги CLI поверх
    let mut cfg = RotatorConfig::from_env().with_vm_filter(args.vms);
    if args.prune_only {
        cfg = cfg.with_prune_only(true);
    }
    if args.dry_run {
        cfg = cfg.with_dry_run(true);
    }
    if let Some(k) = args.keep {
        cfg = cfg.with_keep(k);
    }
    if args.tag.is_some() {
        cfg = cfg.with_tag(args.tag);
    }
    if args.description.is_some() {
        cfg = cfg.with_description(args.description);
    }
    if let Some(o) = args.order {
        cfg = cfg.with_order(o);
    }
    if let Some(ms) = args.task_timeout_ms {
        cfg = cfg.with_task_timeout_ms(ms);
    }
    if let Some(n) = args.retries {
        cfg = cfg.with_retries(n);
    }
    if let Some(ms) = args.retry_backoff_ms {
        cfg = cfg.with_retry_backoff_ms(ms);
    }
    let cfg = cfg.build();

    let mut platform = FilePlatform::connect(&args.conn.inventory, &params)
        .with_context(|| format!("connect to {}:{}", params.host, params.port))?;

    let summary = Rotator::new(&mut platform, cfg).run()?;

    if args.json {
        let s = serde_json::to_string_pretty(&summary).context("serialize summary")?;
        println!("{s}");
    } else {
        println!("{summary}");
    }
    Ok(())
}
