//! Node: a single addressable element of a [`Tree`](crate::tree::Tree).
//!
//! A node carries identity, structural edges (parent id and ordered child ids),
//! a label set, aggregated stats, and a payload. Edges are plain ids resolved
//! through the owning tree's arena, so nodes never point at each other.

use serde::{Deserialize, Serialize};

/// Whether a node is a leaf (file) or may hold children (folder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Folder,
    File,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
        }
    }
}

/// A label attached to a node. Identity is the `id`; two labels with the same
/// id are the same label regardless of name or color.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color,
        }
    }

    /// Label whose id is its (trimmed) name. Used for labels derived from a
    /// payload's canonical label list.
    pub fn named(name: &str) -> Self {
        let name = name.trim();
        Self::new(name, name, None)
    }

    /// A label is malformed when its id or name is blank.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }
}

/// Aggregated statistics for a node.
///
/// For files only `total_size` and `label_count` are meaningful; the item
/// counters stay zero. For folders every field is a reduction over the direct
/// children's stats, and because recomputation propagates to the root after
/// every change, the reduction summarizes the whole subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_size: u64,
    pub label_count: usize,
    pub total_items: usize,
    pub file_count: usize,
    pub folder_count: usize,
}

/// Behavior a payload must provide to live inside a tree.
///
/// The hooks let the tree keep payload-side pointers (for example a
/// document's owning folder id) in step with structural changes.
pub trait Payload: Clone {
    fn kind(&self) -> NodeKind;

    /// Size contributed to the ancestors' `total_size`.
    fn size(&self) -> u64 {
        0
    }

    /// Called whenever the node is attached under a new parent.
    /// `None` means the parent is the tree root (top level).
    fn set_parent(&mut self, _parent_id: Option<&str>) {}

    /// Called when the node is cloned under a new id.
    fn set_id(&mut self, _id: &str) {}
}

/// A node stored in a tree arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<T> {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) labels: Vec<Label>,
    pub(crate) stats: Stats,
    pub(crate) parent_id: Option<String>,
    pub(crate) children: Vec<String>,
    pub(crate) data: T,
}

impl<T: Payload> Node<T> {
    pub fn new(id: impl Into<String>, name: impl Into<String>, data: T) -> Self {
        let mut node = Self {
            id: id.into(),
            name: name.into(),
            labels: Vec::new(),
            stats: Stats::default(),
            parent_id: None,
            children: Vec::new(),
            data,
        };
        node.stats = node.leaf_stats();
        node
    }

    /// Replace the label set, dropping malformed labels and duplicate ids.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = Label>) -> Self {
        self.replace_labels(labels);
        self.stats = self.leaf_stats();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn is_folder(&self) -> bool {
        self.kind() == NodeKind::Folder
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.labels.iter().any(|l| l.id == label_id)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub(crate) fn replace_labels(&mut self, labels: impl IntoIterator<Item = Label>) {
        self.labels.clear();
        for label in labels {
            if label.is_valid() && !self.has_label(&label.id) {
                self.labels.push(label);
            }
        }
    }

    /// Stats this node has on its own, before any children are folded in.
    pub(crate) fn leaf_stats(&self) -> Stats {
        match self.kind() {
            NodeKind::File => Stats {
                total_size: self.data.size(),
                label_count: self.labels.len(),
                ..Stats::default()
            },
            NodeKind::Folder => Stats {
                label_count: self.labels.len(),
                ..Stats::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Blob(u64);

    impl Payload for Blob {
        fn kind(&self) -> NodeKind {
            NodeKind::File
        }

        fn size(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_with_labels_drops_duplicates_and_blanks() {
        let node = Node::new("a", "A", Blob(3)).with_labels([
            Label::named("work"),
            Label::named(" work "),
            Label::named("   "),
            Label::new("x", "", None),
            Label::named("home"),
        ]);

        let ids: Vec<_> = node.labels().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["work", "home"]);
        assert_eq!(node.stats().label_count, 2);
        assert_eq!(node.stats().total_size, 3);
    }

    #[test]
    fn test_label_named_trims() {
        let label = Label::named("  urgent ");
        assert_eq!(label.id, "urgent");
        assert_eq!(label.name, "urgent");
        assert!(label.is_valid());
    }
}
