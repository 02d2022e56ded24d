// tests/file_platform.rs
//
// FilePlatform: подключение (логин/endpoint/lock), чтение документа в
// ручном JSON-формате, сохранение мутаций после ротации.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::NaiveDate;

use snaprotate::platform::file::{load_inventory, save_inventory};
use snaprotate::platform::CreateSpec;
use snaprotate::{
    flatten, ConnectParams, FilePlatform, PlatformError, Rotator, RotatorConfig, SnapshotService,
    VmRef,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("snaprot-test-{prefix}-{pid}-{t}-{id}"))
}

const INVENTORY: &str = r#"{
  "endpoint": {"host": "vc.lab", "port": 443},
  "accounts": [{"user": "admin", "password": "secret"}],
  "root": {"name": "root", "children": [
    {"datacenter": {"name": "dc1", "vm_folder": {"name": "vm", "children": [
      {"vm": {
        "id": "vm-1",
        "name": "docker",
        "path": "[ds1] docker/docker.vmx",
        "guest": "Ubuntu Linux (64-bit)",
        "power_state": "poweredOn",
        "ip": "10.0.0.5",
        "tools_running": true,
        "snapshot": {
          "roots": [
            {"id": "snapshot-1", "name": "2024-01-01", "create_time": "2024-01-01T03:00:00Z", "state": "poweredOn",
             "children": [
               {"id": "snapshot-2", "name": "2024-01-02", "create_time": "2024-01-02T03:00:00Z",
                "children": [
                  {"id": "snapshot-3", "name": "2024-01-03", "create_time": "2024-01-03T03:00:00Z"}
                ]}
             ]}
          ],
          "current": "snapshot-3"
        }
      }},
      {"vm": {"id": "vm-2", "name": "build"}}
    ]}}}
  ]}
}"#;

fn write_inventory(prefix: &str) -> Result<PathBuf> {
    let root = unique_root(prefix);
    fs::create_dir_all(&root)?;
    let path = root.join("inventory.json");
    fs::write(&path, INVENTORY)?;
    Ok(path)
}

fn params(password: &str) -> ConnectParams {
    ConnectParams::new("vc.lab", "admin", password.to_string())
}

#[test]
fn parses_hand_written_document() -> Result<()> {
    let path = write_inventory("parse")?;
    let inv = load_inventory(&path)?;

    let vms = inv.discover();
    assert_eq!(vms.len(), 2);
    assert_eq!(vms[0].name, "docker");
    assert_eq!(vms[0].location, "dc1/vm");
    assert_eq!(vms[0].ip.as_deref(), Some("10.0.0.5"));
    // normalize: следующая ссылка после snapshot-3
    assert_eq!(inv.next_ref, 4);

    let tree = inv.vm(&VmRef::from("vm-1")).and_then(|e| e.snapshot.clone());
    let names: Vec<String> = tree
        .map(|t| flatten(&t.roots))
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
    Ok(())
}

#[test]
fn connect_failures_are_fatal() -> Result<()> {
    let path = write_inventory("connect")?;

    let missing = path.with_file_name("absent.json");
    let err = FilePlatform::connect(&missing, &params("secret")).err().unwrap();
    assert!(matches!(err, PlatformError::CannotConnect { .. }));
    assert!(err.is_fatal());

    let other_host = ConnectParams::new("elsewhere", "admin", "secret".to_string());
    let err = FilePlatform::connect(&path, &other_host).err().unwrap();
    assert!(matches!(err, PlatformError::CannotConnect { .. }));

    let other_port = params("secret").with_port(8443);
    let err = FilePlatform::connect(&path, &other_port).err().unwrap();
    assert!(matches!(err, PlatformError::CannotConnect { .. }));

    let err = FilePlatform::connect(&path, &params("wrong")).err().unwrap();
    assert_eq!(
        err,
        PlatformError::InvalidLogin {
            user: "admin".to_string()
        }
    );
    assert!(err.is_fatal());

    // Регистр host не важен
    let upper = ConnectParams::new("VC.LAB", "admin", "secret".to_string());
    assert!(FilePlatform::connect(&path, &upper).is_ok());
    Ok(())
}

#[test]
fn exclusive_session_blocks_second_writer() -> Result<()> {
    let path = write_inventory("lock")?;
    let first = FilePlatform::connect(&path, &params("secret"))?;

    let err = FilePlatform::connect(&path, &params("secret")).err().unwrap();
    assert!(matches!(err, PlatformError::CannotConnect { .. }));

    drop(first);
    assert!(FilePlatform::connect(&path, &params("secret")).is_ok());
    Ok(())
}

#[test]
fn read_only_session_refuses_mutations() -> Result<()> {
    let path = write_inventory("ro")?;
    let mut a = FilePlatform::connect_read_only(&path, &params("secret"))?;
    // Несколько читателей одновременно допустимы
    let _b = FilePlatform::connect_read_only(&path, &params("secret"))?;
    assert!(a.is_read_only());

    let err = a
        .create_snapshot(&VmRef::from("vm-1"), &CreateSpec::new("x", "y"))
        .unwrap_err();
    assert!(matches!(err, PlatformError::Inventory(_)));
    assert_eq!(a.list_vms()?.len(), 2);
    Ok(())
}

#[test]
fn rotation_is_persisted() -> Result<()> {
    let path = write_inventory("persist")?;
    let now = NaiveDate::from_ymd_opt(2024, 1, 4)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();

    {
        let mut platform = FilePlatform::connect(&path, &params("secret"))?;
        let cfg = RotatorConfig::default()
            .with_keep(3)
            .with_poll_interval_ms(1)
            .with_vm_filter(["docker"]);
        let summary = Rotator::new(&mut platform, cfg).with_now(now).run()?;
        assert_eq!((summary.created, summary.deleted), (1, 1));
    }

    let inv = load_inventory(&path)?;
    let tree = inv
        .vm(&VmRef::from("vm-1"))
        .and_then(|e| e.snapshot.clone())
        .expect("vm-1 keeps its snapshots");
    let recs = flatten(&tree.roots);
    let names: Vec<&str> = recs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["2024-01-02", "2024-01-03", "2024-01-04"]);
    assert_eq!(recs[2].id.0, "snapshot-4");
    assert_eq!(recs[2].description, "Automatic snapshot taken by snapshot rotator tool");
    assert_eq!(tree.current, Some(recs[2].id.clone()));
    assert_eq!(inv.next_ref, 5);

    // tmp-файл не остаётся
    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    assert!(!PathBuf::from(tmp).exists());
    Ok(())
}

#[test]
fn failed_save_rolls_back_and_reports_failure() -> Result<()> {
    let path = write_inventory("nosave")?;
    let before = fs::read(&path)?;
    let now = NaiveDate::from_ymd_opt(2024, 1, 4)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();

    // Каталог на месте <inventory>.tmp: открыть tmp-файл на запись нельзя
    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::create_dir_all(&tmp)?;

    let mut platform = FilePlatform::connect(&path, &params("secret"))?;
    let cfg = RotatorConfig::default()
        .with_keep(3)
        .with_poll_interval_ms(1)
        .with_vm_filter(["docker"]);
    let summary = Rotator::new(&mut platform, cfg.clone()).with_now(now).run()?;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.create_failed, 1);
    assert_eq!(summary.deleted, 0);
    assert_eq!(fs::read(&path)?, before);

    // Память совпадает с диском: снапшота, о котором отчитались как о неудаче, нет
    let tree = platform
        .inventory()
        .vm(&VmRef::from("vm-1"))
        .and_then(|e| e.snapshot.clone())
        .expect("vm-1 keeps its snapshots");
    assert_eq!(flatten(&tree.roots).len(), 3);

    // Следующая успешная запись не приносит «проваленный» снапшот
    fs::remove_dir(&tmp)?;
    let summary = Rotator::new(&mut platform, cfg).with_now(now).run()?;
    assert_eq!((summary.created, summary.deleted), (1, 1));
    drop(platform);

    let inv = load_inventory(&path)?;
    let tree = inv
        .vm(&VmRef::from("vm-1"))
        .and_then(|e| e.snapshot.clone())
        .expect("vm-1 keeps its snapshots");
    let recs = flatten(&tree.roots);
    let names: Vec<&str> = recs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["2024-01-02", "2024-01-03", "2024-01-04"]);
    assert_eq!(recs[2].id.0, "snapshot-4");
    Ok(())
}

#[test]
fn dry_run_leaves_document_untouched() -> Result<()> {
    let path = write_inventory("dry")?;
    let before = fs::read(&path)?;
    {
        let mut platform = FilePlatform::connect(&path, &params("secret"))?;
        let cfg = RotatorConfig::default().with_keep(1).with_dry_run(true);
        let summary = Rotator::new(&mut platform, cfg).run()?;
        assert_eq!(summary.created, 2);
        assert_eq!(summary.deleted, 3);
    }
    assert_eq!(fs::read(&path)?, before);
    Ok(())
}

#[test]
fn save_then_load_keeps_document() -> Result<()> {
    let path = write_inventory("save")?;
    let inv = load_inventory(&path)?;
    save_inventory(&path, &inv)?;
    assert_eq!(load_inventory(&path)?, inv);
    Ok(())
}
