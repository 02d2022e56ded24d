//! snapshot — модель снапшотов VM.
//!
//! - SnapshotNode: узел дерева в том виде, как его отдаёт платформа (с детьми).
//! - SnapshotRecord: плоская запись после flatten() (+ путь и глубина).
//! - SnapshotRef: непрозрачная ссылка платформы на конкретный узел. Именно она
//!   используется для удаления: имена снапшотов не уникальны.
//! - flatten.rs: обход дерева, упорядочивание, resolve ссылки в текущем дереве.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod flatten;

pub use flatten::{flatten, order_records, resolve};

/// Opaque platform reference of a snapshot node (e.g. `snapshot-17`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotRef(pub String);

impl SnapshotRef {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SnapshotRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Index sequence from the root list down to a node: `[0, 2]` is the third
/// child of the first root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotPath(pub Vec<usize>);

impl SnapshotPath {
    pub fn root(i: usize) -> Self {
        Self(vec![i])
    }

    pub fn child(&self, i: usize) -> Self {
        let mut v = Vec::with_capacity(self.0.len() + 1);
        v.extend_from_slice(&self.0);
        v.push(i);
        Self(v)
    }

    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Путь родителя; None для корня.
    pub fn parent(&self) -> Option<SnapshotPath> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }
}

impl fmt::Display for SnapshotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{idx}")?;
        }
        Ok(())
    }
}

/// Platform-reported VM power state captured with the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotState {
    #[default]
    PoweredOff,
    PoweredOn,
    Suspended,
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotState::PoweredOff => "poweredOff",
            SnapshotState::PoweredOn => "poweredOn",
            SnapshotState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// Узел дерева снапшотов (как в инвентаре платформы).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: SnapshotRef,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub state: SnapshotState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    pub fn new<S: Into<String>>(id: SnapshotRef, name: S, create_time: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            create_time,
            state: SnapshotState::default(),
            children: Vec::new(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, d: S) -> Self {
        self.description = d.into();
        self
    }

    pub fn with_children(mut self, children: Vec<SnapshotNode>) -> Self {
        self.children = children;
        self
    }
}

/// Flattened snapshot: one entry per node reachable from the roots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub id: SnapshotRef,
    pub name: String,
    pub description: String,
    pub create_time: DateTime<Utc>,
    pub state: SnapshotState,
    pub path: SnapshotPath,
    pub depth: usize,
}

impl SnapshotRecord {
    fn from_node(node: &SnapshotNode, path: SnapshotPath) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            create_time: node.create_time,
            state: node.state,
            depth: path.depth(),
            path,
        }
    }
}

/// How the flattened list is ordered before planning. Index 0 is treated as
/// the oldest snapshot either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotOrder {
    /// Pre-order traversal order, trusting that the platform lists roots by age.
    Traversal,
    /// Stable sort by `create_time`; ties keep traversal order.
    #[default]
    CreateTime,
}

impl fmt::Display for SnapshotOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotOrder::Traversal => f.write_str("traversal"),
            SnapshotOrder::CreateTime => f.write_str("create-time"),
        }
    }
}

impl FromStr for SnapshotOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "traversal" | "tree" => Ok(SnapshotOrder::Traversal),
            "create-time" | "create_time" | "createtime" | "time" => Ok(SnapshotOrder::CreateTime),
            other => Err(format!(
                "unknown snapshot order '{other}' (expected traversal|create-time)"
            )),
        }
    }
}

/// Node at `path`, if the path is valid for this tree.
pub fn node_at<'a>(roots: &'a [SnapshotNode], path: &SnapshotPath) -> Option<&'a SnapshotNode> {
    let (first, rest) = path.0.split_first()?;
    let mut node = roots.get(*first)?;
    for idx in rest {
        node = node.children.get(*idx)?;
    }
    Some(node)
}

pub fn node_at_mut<'a>(
    roots: &'a mut [SnapshotNode],
    path: &SnapshotPath,
) -> Option<&'a mut SnapshotNode> {
    let (first, rest) = path.0.split_first()?;
    let mut node = roots.get_mut(*first)?;
    for idx in rest {
        node = node.children.get_mut(*idx)?;
    }
    Some(node)
}

/// Sibling list that contains the node at `path` (the root list for depth 0).
pub fn siblings_mut<'a>(
    roots: &'a mut Vec<SnapshotNode>,
    path: &SnapshotPath,
) -> Option<&'a mut Vec<SnapshotNode>> {
    let (_, parents) = path.0.split_last()?;
    let mut list = roots;
    for idx in parents {
        list = &mut list.get_mut(*idx)?.children;
    }
    Some(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let p = SnapshotPath::root(1).child(0).child(2);
        assert_eq!(p.to_string(), "1/0/2");
        assert_eq!(p.depth(), 2);
        assert_eq!(p.last_index(), Some(2));
        assert_eq!(p.parent(), Some(SnapshotPath(vec![1, 0])));
        assert_eq!(SnapshotPath::root(3).parent(), None);
    }

    #[test]
    fn node_lookup_by_path() {
        let t = DateTime::<Utc>::default();
        let mut roots = vec![SnapshotNode::new("a".into(), "a", t)
            .with_children(vec![SnapshotNode::new("b".into(), "b", t)])];

        let b = SnapshotPath(vec![0, 0]);
        assert_eq!(node_at(&roots, &b).map(|n| n.name.as_str()), Some("b"));
        assert!(node_at(&roots, &SnapshotPath(vec![0, 5])).is_none());
        assert!(node_at(&roots, &SnapshotPath(vec![])).is_none());

        node_at_mut(&mut roots, &b).unwrap().name = "b2".to_string();
        let sib = siblings_mut(&mut roots, &b).unwrap();
        assert_eq!(sib.len(), 1);
        assert_eq!(sib[0].name, "b2");
    }
}
