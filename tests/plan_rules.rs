// tests/plan_rules.rs
//
// Запуск:
//   cargo test --test plan_rules
//
// Правила планировщика: число create/delete, порядок удалений, разрешение
// коллизий имён, prune-only и keep = 0.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use snaprotate::plan::deletion_count;
use snaprotate::{
    flatten, plan, resolve_snapshot_name, Action, PlanOptions, SnapshotNode, SnapshotRecord,
    SnapshotRef,
};

fn ts(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
}

fn today() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 4)
        .unwrap()
        .and_hms_opt(13, 5, 9)
        .unwrap()
}

/// Linear chain: every snapshot is a child of the previous one.
fn chain(names: &[&str]) -> Vec<SnapshotNode> {
    let mut node: Option<SnapshotNode> = None;
    for (i, name) in names.iter().enumerate().rev() {
        let id = SnapshotRef::new(format!("snapshot-{}", i + 1));
        let mut n = SnapshotNode::new(id, *name, ts(i as u32 + 1));
        if let Some(child) = node.take() {
            n.children.push(child);
        }
        node = Some(n);
    }
    node.into_iter().collect()
}

fn records(names: &[&str]) -> Vec<SnapshotRecord> {
    flatten(&chain(names))
}

fn opts(keep: u32) -> PlanOptions {
    PlanOptions {
        keep,
        ..PlanOptions::default()
    }
}

fn deleted_names(p: &snaprotate::RotationPlan) -> Vec<String> {
    p.deletes().map(|t| t.name.clone()).collect()
}

#[test]
fn fewer_than_keep_creates_only() {
    for n in 0..5usize {
        let names: Vec<String> = (1..=n).map(|d| format!("2023-12-{d:02}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let p = plan(&records(&refs), &opts(5), today());
        assert_eq!(p.create().map(|c| c.0), Some("2024-01-04"), "n={n}");
        assert_eq!(p.delete_count(), 0, "n={n}");
    }
}

#[test]
fn equal_to_keep_creates_and_deletes_oldest() {
    let recs = records(&["2024-01-01", "2024-01-02", "2024-01-03"]);
    let p = plan(&recs, &opts(3), today());

    assert_eq!(
        p.actions[0],
        Action::Create {
            name: "2024-01-04".to_string(),
            description: "Automatic snapshot taken by snapshot rotator tool".to_string(),
        }
    );
    assert_eq!(p.delete_count(), 1);
    let target = p.deletes().next().unwrap();
    assert_eq!(target.id, recs[0].id);
    assert_eq!(target.name, "2024-01-01");
}

#[test]
fn same_tree_with_larger_keep_creates_only() {
    let recs = records(&["2024-01-01", "2024-01-02", "2024-01-03"]);
    let p = plan(&recs, &opts(5), today());
    assert_eq!(p.actions.len(), 1);
    assert_eq!(p.create().map(|c| c.0), Some("2024-01-04"));
}

#[test]
fn more_than_keep_deletes_down_to_keep_minus_one() {
    let recs = records(&["a", "b", "c", "d", "e"]);
    let p = plan(&recs, &opts(3), today());

    assert!(p.create().is_some());
    assert_eq!(deleted_names(&p), vec!["a", "b", "c"]);
    // Create всегда идёт первым
    assert!(matches!(p.actions[0], Action::Create { .. }));
    for (i, t) in p.deletes().enumerate() {
        assert_eq!(t.id, recs[i].id);
    }
}

#[test]
fn deletion_count_matches_rule_for_all_small_inputs() {
    for keep in 1..6u32 {
        for n in 0..10usize {
            let expected = if n < keep as usize {
                0
            } else if n == keep as usize {
                1
            } else {
                n - (keep as usize - 1)
            };
            assert_eq!(deletion_count(n, keep), expected, "n={n} keep={keep}");
        }
    }
}

#[test]
fn keep_zero_is_clamped_to_existing_snapshots() {
    assert_eq!(deletion_count(0, 0), 0);
    assert_eq!(deletion_count(4, 0), 4);

    let empty = plan(&[], &opts(0), today());
    assert!(empty.create().is_some());
    assert_eq!(empty.delete_count(), 0);

    let recs = records(&["a", "b"]);
    let p = plan(&recs, &opts(0), today());
    assert!(p.create().is_some());
    assert_eq!(deleted_names(&p), vec!["a", "b"]);
}

#[test]
fn prune_only_never_creates() {
    for n in 0..7usize {
        let names: Vec<String> = (0..n).map(|i| format!("s{i}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let recs = records(&refs);

        let normal = plan(&recs, &opts(3), today());
        let pruned = plan(
            &recs,
            &PlanOptions {
                keep: 3,
                prune_only: true,
                ..PlanOptions::default()
            },
            today(),
        );
        assert!(pruned.create().is_none(), "n={n}");
        assert_eq!(deleted_names(&pruned), deleted_names(&normal), "n={n}");
    }
}

#[test]
fn today_label_collision_escalates_to_timestamp() {
    let recs = records(&["2024-01-02", "2024-01-04"]);
    let name = resolve_snapshot_name(&recs, None, today());
    assert_eq!(name, "2024-01-04T13:05:09");
    assert_ne!(name, "2024-01-04");
    assert!(recs.iter().all(|r| r.name != name));

    let p = plan(&recs, &opts(3), today());
    assert_eq!(p.create().map(|c| c.0), Some("2024-01-04T13:05:09"));
}

#[test]
fn timestamp_collision_gets_numeric_suffix() {
    let recs = records(&["2024-01-04", "2024-01-04T13:05:09", "2024-01-04T13:05:09-1"]);
    let name = resolve_snapshot_name(&recs, None, today());
    assert_eq!(name, "2024-01-04T13:05:09-2");
}

#[test]
fn tag_is_appended_to_the_chosen_candidate() {
    let none = resolve_snapshot_name(&[], Some("daily"), today());
    assert_eq!(none, "2024-01-04 daily");

    let recs = records(&["2024-01-04 daily"]);
    let escalated = resolve_snapshot_name(&recs, Some("daily"), today());
    assert_eq!(escalated, "2024-01-04T13:05:09 daily");

    // Решение об эскалации принимается по дате без тега
    let recs = records(&["2024-01-04"]);
    assert_eq!(
        resolve_snapshot_name(&recs, Some("daily"), today()),
        "2024-01-04T13:05:09 daily"
    );
}

#[test]
fn tagged_timestamp_collision_gets_numeric_suffix() {
    let recs = records(&["2024-01-04", "2024-01-04T13:05:09 daily"]);
    assert_eq!(
        resolve_snapshot_name(&recs, Some("daily"), today()),
        "2024-01-04T13:05:09-1 daily"
    );

    // Снапшот с другим тегом голую дату не занимает
    let recs = records(&["2024-01-04 weekly"]);
    let name = resolve_snapshot_name(&recs, Some("daily"), today());
    assert_eq!(name, "2024-01-04 daily");
}

#[test]
fn description_override_is_used() {
    let p = plan(
        &[],
        &PlanOptions {
            keep: 3,
            description: Some("nightly".to_string()),
            ..PlanOptions::default()
        },
        today(),
    );
    assert_eq!(p.create(), Some(("2024-01-04", "nightly")));
}

#[test]
fn describe_narrates_decision() {
    let recs = records(&["a", "b", "c"]);
    let p = plan(&recs, &opts(3), today());
    assert_eq!(
        p.describe(),
        "3 snapshots found, should create a snapshot and delete oldest one"
    );
    let p = plan(&recs, &opts(5), today());
    assert_eq!(p.describe(), "3 snapshots found, should create a snapshot");
}
