use anyhow::{Context, Result};
use serde_json::json;

use snaprotate::{flatten, order_records, FilePlatform, RotatorConfig, SnapshotService};

use crate::cli::ListArgs;
use crate::util::connect_params;

/// Print VMs and their snapshots, oldest first.
pub fn exec(args: ListArgs) -> Result<()> {
    let params = connect_params(&args.conn)?;
    let mut cfg = RotatorConfig::from_env().with_vm_filter(args.vms);
    if let Some(o) = args.order {
        cfg = cfg.with_order(o);
    }

    let mut platform = FilePlatform::connect_read_only(&args.conn.inventory, &params)
        .with_context(|| format!("connect to {}:{}", params.host, params.port))?;

    let vms = platform.list_vms().context("list VMs")?;
    let mut out = Vec::new();
    for vm in vms.into_iter().filter(|v| cfg.selects_vm(&v.name)) {
        let tree = platform
            .snapshot_tree(&vm.id)
            .with_context(|| format!("read snapshot tree of vm '{}'", vm.name))?;
        let roots = tree.map(|t| t.roots).unwrap_or_default();
        let records = order_records(flatten(&roots), cfg.order);
        out.push((vm, records));
    }

    if args.json {
        let arr: Vec<_> = out
            .iter()
            .map(|(vm, records)| json!({ "vm": vm, "snapshots": records }))
            .collect();
        let s = serde_json::to_string_pretty(&arr).context("serialize listing")?;
        println!("{s}");
        return Ok(());
    }

    if out.is_empty() {
        println!("(no VMs)");
        return Ok(());
    }
    for (vm, records) in &out {
        println!("{} ({})", vm.name, vm.id);
        println!("  location    = {}", vm.location);
        println!("  path        = {}", vm.path);
        println!("  guest       = {}", vm.guest);
        println!("  state       = {}", vm.power_state);
        if let Some(ip) = vm.ip.as_deref() {
            println!("  ip          = {}", ip);
        }
        if let Some(a) = vm.annotation.as_deref().filter(|a| !a.is_empty()) {
            println!("  annotation  = {}", a);
        }
        if let Some(q) = vm.question.as_deref() {
            println!("  question    = {}", q);
        }
        println!("  snapshots ({}):", records.len());
        for (i, r) in records.iter().enumerate() {
            println!(
                "    [{i:3}] {:<28} {}  {:<10} {} @{}",
                r.name, r.create_time, r.state, r.id, r.path
            );
        }
    }
    Ok(())
}
