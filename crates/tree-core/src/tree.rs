//! Tree: arena-backed hierarchy with O(1) lookup by id.
//!
//! Nodes live in a flat map keyed by id and reference each other only by id.
//! The map doubles as the root index: a node is in the map if and only if it
//! is attached somewhere under the root. Structural operations report failure
//! with `false`/`None` and leave the tree untouched in that case.
//!
//! Every traversal is iterative and guarded by a visited set, so neither very
//! deep trees nor a corrupted parent chain can overflow the stack or loop.

use crate::node::{Label, Node, NodeKind, Payload, Stats};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// A subtree removed from a tree, kept whole so it can be attached again.
#[derive(Debug, Clone)]
pub struct Detached<T> {
    root_id: String,
    former_parent_id: Option<String>,
    former_index: usize,
    /// Breadth-first, subtree root first.
    nodes: Vec<Node<T>>,
}

impl<T: Payload> Detached<T> {
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Parent the subtree was detached from.
    pub fn former_parent_id(&self) -> Option<&str> {
        self.former_parent_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id())
    }

    pub fn root(&self) -> Option<&Node<T>> {
        self.nodes.first()
    }
}

#[derive(Debug, Clone)]
pub struct Tree<T> {
    root_id: String,
    nodes: HashMap<String, Node<T>>,
}

impl<T: Payload> Tree<T> {
    /// Create a tree whose root is `root`. The root is designated here and
    /// only here; its name carries no meaning.
    pub fn new(mut root: Node<T>) -> Self {
        root.parent_id = None;
        root.children.clear();
        root.stats = root.leaf_stats();
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self { root_id, nodes }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn root(&self) -> &Node<T> {
        // The root is inserted at construction and can never be detached.
        &self.nodes[&self.root_id]
    }

    pub fn is_root(&self, id: &str) -> bool {
        self.root_id == id
    }

    /// Number of attached nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node<T>> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Node<T>> {
        self.nodes.get_mut(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn children_of(&self, id: &str) -> Vec<&Node<T>> {
        self.get(id)
            .map(|node| node.children.iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    /// Topmost node reachable by following parent links from `id`.
    ///
    /// Returns `None` if `id` is unknown or the chain is broken or cyclic.
    pub fn root_of(&self, id: &str) -> Option<&Node<T>> {
        let mut visited = HashSet::new();
        let mut current = self.get(id)?;
        loop {
            if !visited.insert(current.id.as_str()) {
                return None;
            }
            match current.parent_id.as_deref() {
                None => return Some(current),
                Some(parent_id) => current = self.get(parent_id)?,
            }
        }
    }

    /// Proper ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&Node<T>> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id);
        let mut next = self.get(id).and_then(|n| n.parent_id.as_deref());
        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            out.push(parent);
            next = parent.parent_id.as_deref();
        }
        out
    }

    /// True when `ancestor` is a proper ancestor of `id`.
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        self.ancestors(id).iter().any(|n| n.id == ancestor)
    }

    /// Path from the root down to `id`, both ends included.
    pub fn path(&self, id: &str) -> Vec<&Node<T>> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        let mut path = self.ancestors(id);
        path.reverse();
        path.push(node);
        path
    }

    /// Pre-order descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<&Node<T>> {
        let mut out = Vec::new();
        let Some(start) = self.get(id) else {
            return out;
        };
        let mut visited = HashSet::new();
        visited.insert(start.id.as_str());
        let mut stack: Vec<&str> = start.children.iter().rev().map(String::as_str).collect();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(node);
            stack.extend(node.children.iter().rev().map(String::as_str));
        }
        out
    }

    /// Pre-order search of the subtree under `start` (inclusive).
    pub fn find_in_subtree(
        &self,
        start: &str,
        mut predicate: impl FnMut(&Node<T>) -> bool,
    ) -> Option<&Node<T>> {
        let node = self.get(start)?;
        if predicate(node) {
            return Some(node);
        }
        self.descendants(start).into_iter().find(|n| predicate(*n))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Node<T>> {
        self.find_in_subtree(&self.root_id, |n| n.name == name)
    }

    /// Attach a node that is not yet in the tree under `parent_id`.
    ///
    /// Fails if the id is already taken or the parent is missing or is a file.
    /// Any children listed on the incoming node are discarded.
    pub fn insert(&mut self, parent_id: &str, mut node: Node<T>) -> bool {
        if self.contains(&node.id) || !self.accepts_children(parent_id) {
            return false;
        }
        let id = node.id.clone();
        node.children.clear();
        node.parent_id = Some(parent_id.to_string());
        node.data.set_parent(self.payload_parent(parent_id));
        node.stats = node.leaf_stats();
        self.nodes.insert(id.clone(), node);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(id.clone());
        }
        self.refresh_stats(&id);
        true
    }

    /// Move an attached node (and its subtree) under `parent_id`.
    ///
    /// Rejected when the move would create a cycle (`child_id` is `parent_id`
    /// or one of its ancestors), when the child is the root, when it is
    /// already a child of `parent_id`, or when the parent is a file.
    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        if parent_id == child_id || self.is_root(child_id) {
            return false;
        }
        if !self.contains(child_id) || !self.accepts_children(parent_id) {
            return false;
        }
        if self.is_ancestor(child_id, parent_id) {
            debug!(parent_id, child_id, "rejecting move that would create a cycle");
            return false;
        }
        if self.nodes[parent_id].children.iter().any(|c| c == child_id) {
            return false;
        }

        let old_parent = self.nodes[child_id].parent_id.clone();
        if let Some(old_parent_id) = old_parent.as_deref() {
            if let Some(old) = self.nodes.get_mut(old_parent_id) {
                old.children.retain(|c| c != child_id);
            }
        }

        let payload_parent = self.payload_parent(parent_id).map(str::to_string);
        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent_id = Some(parent_id.to_string());
            child.data.set_parent(payload_parent.as_deref());
        }
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.push(child_id.to_string());
        }

        if let Some(old_parent_id) = old_parent.as_deref() {
            self.refresh_stats(old_parent_id);
        }
        self.refresh_stats(parent_id);
        true
    }

    /// Move `child_id` from `old_parent_id` to `new_parent_id`.
    ///
    /// Fails unless the child currently sits directly under `old_parent_id`.
    pub fn move_node(&mut self, old_parent_id: &str, new_parent_id: &str, child_id: &str) -> bool {
        match self.get(child_id) {
            Some(child) if child.parent_id.as_deref() == Some(old_parent_id) => {}
            _ => return false,
        }
        if !self.contains(new_parent_id) {
            return false;
        }
        self.add_child(new_parent_id, child_id)
    }

    /// Remove a direct child of `parent_id` together with its subtree.
    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        let is_child = self
            .get(parent_id)
            .is_some_and(|p| p.children.iter().any(|c| c == child_id));
        is_child && self.detach(child_id).is_some()
    }

    /// Take `id` and its whole subtree out of the tree.
    ///
    /// The root cannot be detached.
    pub fn detach(&mut self, id: &str) -> Option<Detached<T>> {
        if self.is_root(id) || !self.contains(id) {
            return None;
        }

        let former_parent_id = self.nodes[id].parent_id.clone();
        let mut former_index = 0;
        if let Some(parent) = former_parent_id.as_deref().and_then(|p| self.nodes.get_mut(p)) {
            former_index = parent.children.iter().position(|c| c == id).unwrap_or(0);
            parent.children.retain(|c| c != id);
        }

        let mut nodes = Vec::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.remove(&current) {
                queue.extend(node.children.iter().cloned());
                nodes.push(node);
            }
        }

        if let Some(parent_id) = former_parent_id.as_deref() {
            self.refresh_stats(parent_id);
        }

        Some(Detached {
            root_id: id.to_string(),
            former_parent_id,
            former_index,
            nodes,
        })
    }

    /// Put a detached subtree back under `parent_id`.
    ///
    /// When re-attaching to the parent it was detached from, the subtree
    /// returns to its former sibling position if that index still exists.
    /// On failure (missing/file parent, id collision) the subtree is handed
    /// back unchanged.
    pub fn attach(&mut self, parent_id: &str, mut detached: Detached<T>) -> Result<(), Detached<T>> {
        if detached.nodes.is_empty() || !self.accepts_children(parent_id) {
            return Err(detached);
        }
        if detached.nodes.iter().any(|n| self.contains(&n.id)) {
            return Err(detached);
        }

        let payload_parent = self.payload_parent(parent_id).map(str::to_string);
        if let Some(top) = detached.nodes.first_mut() {
            top.parent_id = Some(parent_id.to_string());
            top.data.set_parent(payload_parent.as_deref());
        }

        let root_id = detached.root_id.clone();
        let same_parent = detached.former_parent_id.as_deref() == Some(parent_id);
        for node in detached.nodes {
            self.nodes.insert(node.id.clone(), node);
        }
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            let index = if same_parent {
                detached.former_index.min(parent.children.len())
            } else {
                parent.children.len()
            };
            parent.children.insert(index, root_id);
        }
        self.refresh_stats(parent_id);
        Ok(())
    }

    /// Add a label to a node. No-op (false) if the label is malformed or the
    /// node already carries a label with that id.
    pub fn add_label(&mut self, id: &str, label: Label) -> bool {
        if !label.is_valid() {
            return false;
        }
        match self.nodes.get_mut(id) {
            Some(node) if !node.has_label(&label.id) => node.labels.push(label),
            _ => return false,
        }
        self.refresh_stats(id);
        true
    }

    /// Remove the label with `label_id`. No-op (false) if it is not present.
    pub fn remove_label(&mut self, id: &str, label_id: &str) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let before = node.labels.len();
        node.labels.retain(|l| l.id != label_id);
        if node.labels.len() == before {
            return false;
        }
        self.refresh_stats(id);
        true
    }

    /// Point the payload's parent hook at the node's current parent.
    pub(crate) fn sync_payload_parent(&mut self, id: &str) -> bool {
        let Some(parent_id) = self.get(id).and_then(|n| n.parent_id.clone()) else {
            return false;
        };
        let payload_parent = self.payload_parent(&parent_id).map(str::to_string);
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.data.set_parent(payload_parent.as_deref());
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_labels(&mut self, id: &str, labels: Vec<Label>) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.replace_labels(labels);
        self.refresh_stats(id);
        true
    }

    /// Recompute stats for `id` and every ancestor up to the root.
    pub fn refresh_stats(&mut self, id: &str) {
        let mut visited = HashSet::new();
        let mut current = Some(id.to_string());
        while let Some(node_id) = current {
            if !visited.insert(node_id.clone()) {
                break;
            }
            current = self.recompute_node(&node_id);
        }
    }

    /// Recompute stats for every node in one post-order pass.
    pub fn recompute_all(&mut self) {
        let mut order = vec![self.root_id.clone()];
        order.extend(self.descendants(&self.root_id).iter().map(|n| n.id.clone()));
        for id in order.iter().rev() {
            self.recompute_node(id);
        }
    }

    /// Recompute one node from its direct children; returns its parent id.
    fn recompute_node(&mut self, id: &str) -> Option<String> {
        let node = self.nodes.get(id)?;
        let mut stats = node.leaf_stats();
        if node.kind() == NodeKind::Folder {
            for child in node.children.iter().filter_map(|c| self.nodes.get(c)) {
                fold_child(&mut stats, child);
            }
        }
        let parent = node.parent_id.clone();
        if let Some(node) = self.nodes.get_mut(id) {
            node.stats = stats;
        }
        parent
    }

    /// Deep copy of the subtree under `id` as an independent tree.
    ///
    /// The copy's root gets `new_id` (a fresh UUID if none is given); every
    /// descendant gets `"<new root id>::<original id>"`.
    pub fn clone_subtree(&self, id: &str, new_id: Option<&str>) -> Option<Tree<T>> {
        let source = self.get(id)?;
        let new_root_id = new_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let remap = |original: &str| -> String {
            if original == id {
                new_root_id.clone()
            } else {
                format!("{new_root_id}::{original}")
            }
        };

        let mut nodes = HashMap::new();
        let mut stack = vec![source];
        let mut visited = HashSet::new();
        while let Some(node) = stack.pop() {
            if !visited.insert(node.id.as_str()) {
                continue;
            }
            let mut copy = node.clone();
            copy.id = remap(&node.id);
            copy.data.set_id(&copy.id);
            copy.children = node.children.iter().map(|c| remap(c)).collect();
            if node.id == id {
                copy.parent_id = None;
                copy.data.set_parent(None);
            } else {
                copy.parent_id = node.parent_id.as_deref().map(|p| remap(p));
                // Direct children of the copied root are top level in the clone.
                let payload_parent = match node.parent_id.as_deref() {
                    Some(p) if p == id => None,
                    other => other.map(|p| remap(p)),
                };
                copy.data.set_parent(payload_parent.as_deref());
            }
            nodes.insert(copy.id.clone(), copy);
            stack.extend(node.children.iter().filter_map(|c| self.get(c)));
        }

        Some(Tree {
            root_id: new_root_id,
            nodes,
        })
    }

    pub fn clone_tree(&self, new_id: Option<&str>) -> Tree<T> {
        let root_id = self.root_id.clone();
        self.clone_subtree(&root_id, new_id)
            .unwrap_or_else(|| Tree::new(self.root().clone()))
    }

    /// ASCII rendering of the subtree under `id` using `label` per node.
    pub fn render_with(&self, id: &str, label: impl Fn(&Node<T>) -> String) -> String {
        let mut out = String::new();
        let Some(start) = self.get(id) else {
            return out;
        };
        out.push_str(&label(start));
        out.push('\n');

        let mut visited = HashSet::new();
        visited.insert(start.id.as_str());
        // (node id, prefix for its own line, is last sibling)
        let mut stack: Vec<(&str, String, bool)> = Vec::new();
        push_children(&mut stack, &start.children, "");
        while let Some((current, prefix, last)) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push_str(&prefix);
            out.push_str(if last { "└── " } else { "├── " });
            out.push_str(&label(node));
            out.push('\n');
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            push_children(&mut stack, &node.children, &child_prefix);
        }
        out
    }

    pub fn render(&self, id: &str) -> String {
        self.render_with(id, |n| format!("{} ({})", n.name, n.kind().as_str()))
    }

    pub(crate) fn from_parts(root_id: String, nodes: HashMap<String, Node<T>>) -> Self {
        Self { root_id, nodes }
    }

    fn accepts_children(&self, id: &str) -> bool {
        self.get(id).is_some_and(|n| n.kind() == NodeKind::Folder)
    }

    /// Parent id as seen by payloads: children of the root are top level.
    fn payload_parent<'a>(&self, parent_id: &'a str) -> Option<&'a str> {
        (!self.is_root(parent_id)).then_some(parent_id)
    }
}

fn fold_child<T: Payload>(stats: &mut Stats, child: &Node<T>) {
    stats.total_size += child.stats.total_size;
    stats.label_count += child.stats.label_count;
    match child.kind() {
        NodeKind::File => stats.file_count += 1,
        NodeKind::Folder => {
            stats.folder_count += 1 + child.stats.folder_count;
            stats.file_count += child.stats.file_count;
        }
    }
    stats.total_items = stats.file_count + stats.folder_count;
}

fn push_children<'a>(stack: &mut Vec<(&'a str, String, bool)>, children: &'a [String], prefix: &str) {
    let count = children.len();
    for (index, child) in children.iter().enumerate().rev() {
        stack.push((child.as_str(), prefix.to_string(), index + 1 == count));
    }
}
