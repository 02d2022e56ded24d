//! Flattening of the recursive snapshot tree and reference resolution.
//!
//! Обход — явный стек (pre-order), без рекурсии: глубина дерева у платформы
//! не ограничена.

use super::{SnapshotNode, SnapshotOrder, SnapshotPath, SnapshotRecord, SnapshotRef};
use crate::error::RotateError;
use crate::platform::VmRef;

/// Pre-order flattening: node, then its subtree, then the next sibling.
///
/// The result is traversal order, not chronological order. Callers that
/// want "index 0 is oldest" by timestamp pass the result through
/// [`order_records`] with [`SnapshotOrder::CreateTime`].
pub fn flatten(roots: &[SnapshotNode]) -> Vec<SnapshotRecord> {
    let mut out = Vec::new();
    let mut stack: Vec<(&SnapshotNode, SnapshotPath)> = Vec::with_capacity(roots.len());

    // Кладём в обратном порядке, чтобы снимать со стека в исходном.
    for (i, node) in roots.iter().enumerate().rev() {
        stack.push((node, SnapshotPath::root(i)));
    }

    while let Some((node, path)) = stack.pop() {
        for (i, child) in node.children.iter().enumerate().rev() {
            stack.push((child, path.child(i)));
        }
        out.push(SnapshotRecord::from_node(node, path));
    }
    out
}

/// Apply the configured ordering. `CreateTime` is a stable sort, so records
/// with equal timestamps keep their traversal order.
pub fn order_records(mut records: Vec<SnapshotRecord>, order: SnapshotOrder) -> Vec<SnapshotRecord> {
    if order == SnapshotOrder::CreateTime {
        records.sort_by_key(|r| r.create_time);
    }
    records
}

/// Find the unique node carrying `id` in the current tree of `vm`.
///
/// Ошибка, если узел не найден или найден больше одного раза: первый
/// попавшийся никогда не выбирается молча.
pub fn resolve(
    vm: &VmRef,
    roots: &[SnapshotNode],
    id: &SnapshotRef,
) -> Result<SnapshotPath, RotateError> {
    let mut found = find_paths(roots, id);
    match found.len() {
        0 => Err(RotateError::SnapshotNotFound {
            vm: vm.clone(),
            snapshot: id.clone(),
        }),
        1 => Ok(found.remove(0)),
        n => Err(RotateError::AmbiguousSnapshot {
            vm: vm.clone(),
            snapshot: id.clone(),
            matches: n,
        }),
    }
}

fn find_paths(roots: &[SnapshotNode], id: &SnapshotRef) -> Vec<SnapshotPath> {
    let mut hits = Vec::new();
    let mut stack: Vec<(&SnapshotNode, SnapshotPath)> = roots
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (n, SnapshotPath::root(i)))
        .collect();

    while let Some((node, path)) = stack.pop() {
        if &node.id == id {
            hits.push(path.clone());
        }
        for (i, child) in node.children.iter().enumerate().rev() {
            stack.push((child, path.child(i)));
        }
    }
    hits
}
