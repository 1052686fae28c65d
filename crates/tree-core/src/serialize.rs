//! Flat JSON form of a [`Tree`].
//!
//! Nodes are written as a breadth-first list with explicit parent and child
//! ids instead of nesting, so neither direction recurses and arbitrarily deep
//! trees round-trip without touching the stack.

use crate::node::{Label, Node, NodeKind, Payload, Stats};
use crate::tree::Tree;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Root node not found: {0}")]
    MissingRoot(String),

    #[error("Duplicate node id: {0}")]
    DuplicateId(String),

    #[error("Node {id} references missing parent {parent_id}")]
    MissingParent { id: String, parent_id: String },

    #[error("Parent/child links disagree for node {0}")]
    ParentMismatch(String),

    #[error("Node {0} is a file but lists children")]
    FileWithChildren(String),

    #[error("{0} node(s) are not reachable from the root")]
    Unreachable(usize),
}

pub type Result<T> = std::result::Result<T, SerializeError>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeWire<T> {
    root_id: String,
    nodes: Vec<NodeWire<T>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeWire<T> {
    id: String,
    name: String,
    kind: NodeKind,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    stats: Stats,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    children: Vec<String>,
    data: T,
}

impl<T: Payload + Serialize> Tree<T> {
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.to_wire())?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_wire())?)
    }

    fn to_wire(&self) -> TreeWire<&T> {
        let mut nodes = Vec::with_capacity(self.len());
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([self.root()]);
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.id()) {
                continue;
            }
            queue.extend(node.children().iter().filter_map(|c| self.get(c)));
            nodes.push(NodeWire {
                id: node.id().to_string(),
                name: node.name().to_string(),
                kind: node.kind(),
                labels: node.labels().to_vec(),
                stats: *node.stats(),
                parent_id: node.parent_id().map(str::to_string),
                children: node.children().to_vec(),
                data: node.data(),
            });
        }
        TreeWire {
            root_id: self.root_id().to_string(),
            nodes,
        }
    }
}

impl<T: Payload + DeserializeOwned> Tree<T> {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        Self::from_wire(serde_json::from_value(value)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_wire(serde_json::from_str(json)?)
    }

    fn from_wire(wire: TreeWire<T>) -> Result<Self> {
        let mut nodes: HashMap<String, Node<T>> = HashMap::with_capacity(wire.nodes.len());
        for entry in wire.nodes {
            if nodes.contains_key(&entry.id) {
                return Err(SerializeError::DuplicateId(entry.id));
            }
            let mut node = Node::new(entry.id, entry.name, entry.data).with_labels(entry.labels);
            node.stats = entry.stats;
            node.parent_id = entry.parent_id;
            node.children = entry.children;
            nodes.insert(node.id.clone(), node);
        }

        let root = nodes
            .get(&wire.root_id)
            .ok_or_else(|| SerializeError::MissingRoot(wire.root_id.clone()))?;
        if root.parent_id.is_some() {
            return Err(SerializeError::ParentMismatch(wire.root_id));
        }

        for node in nodes.values() {
            if node.kind() == NodeKind::File && !node.children.is_empty() {
                return Err(SerializeError::FileWithChildren(node.id.clone()));
            }
            if let Some(parent_id) = node.parent_id.as_deref() {
                let parent = nodes.get(parent_id).ok_or_else(|| SerializeError::MissingParent {
                    id: node.id.clone(),
                    parent_id: parent_id.to_string(),
                })?;
                if !parent.children.contains(&node.id) {
                    return Err(SerializeError::ParentMismatch(node.id.clone()));
                }
            } else if node.id != wire.root_id {
                return Err(SerializeError::ParentMismatch(node.id.clone()));
            }
            for child_id in &node.children {
                match nodes.get(child_id) {
                    Some(child) if child.parent_id.as_deref() == Some(node.id.as_str()) => {}
                    _ => return Err(SerializeError::ParentMismatch(child_id.clone())),
                }
            }
        }

        // Parent links agree with child lists; a node listed twice or a
        // cycle detached from the root shows up as unreachable here.
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([wire.root_id.as_str()]);
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                return Err(SerializeError::ParentMismatch(id.to_string()));
            }
            if let Some(node) = nodes.get(id) {
                queue.extend(node.children.iter().map(String::as_str));
            }
        }
        if visited.len() != nodes.len() {
            return Err(SerializeError::Unreachable(nodes.len() - visited.len()));
        }

        let mut tree = Tree::from_parts(wire.root_id, nodes);
        tree.recompute_all();
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Payload used by the tree tests is not serde-aware; use a small one here.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        folder: bool,
        size: u64,
    }

    impl Payload for Doc {
        fn kind(&self) -> NodeKind {
            if self.folder {
                NodeKind::Folder
            } else {
                NodeKind::File
            }
        }

        fn size(&self) -> u64 {
            self.size
        }
    }

    fn doc_tree() -> Tree<Doc> {
        let mut tree = Tree::new(Node::new("root", "Root", Doc { folder: true, size: 0 }));
        tree.insert("root", Node::new("f", "F", Doc { folder: true, size: 0 }));
        tree.insert(
            "f",
            Node::new("d", "D", Doc { folder: false, size: 4 }).with_labels([Label::named("x")]),
        );
        tree.insert("root", Node::new("e", "E", Doc { folder: false, size: 1 }));
        tree
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let tree = doc_tree();
        let json = tree.to_json().unwrap();
        let back: Tree<Doc> = Tree::from_json(json).unwrap();

        assert_eq!(back.root_id(), "root");
        assert_eq!(back.root().children(), tree.root().children());
        assert_eq!(back.get("d").unwrap().parent_id(), Some("f"));
        assert_eq!(back.get("d").unwrap().labels(), tree.get("d").unwrap().labels());
        assert_eq!(back.root().stats(), tree.root().stats());
        assert_eq!(back.render("root"), tree.render("root"));
    }

    #[test]
    fn test_wire_form_is_flat_breadth_first() {
        let json = doc_tree().to_json().unwrap();
        let ids: Vec<_> = json["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["root", "f", "e", "d"]);
        assert_eq!(json["nodes"][3]["parentId"], "f");
    }

    #[test]
    fn test_rejects_inconsistent_links() {
        let json = json!({
            "rootId": "root",
            "nodes": [
                {"id": "root", "name": "R", "kind": "folder", "data": {"folder": true, "size": 0}},
                {"id": "a", "name": "A", "kind": "file", "parentId": "b", "data": {"folder": false, "size": 0}},
            ]
        });
        assert!(matches!(
            Tree::<Doc>::from_json(json),
            Err(SerializeError::MissingParent { .. })
        ));
    }

    #[test]
    fn test_rejects_detached_cycle() {
        let json = json!({
            "rootId": "root",
            "nodes": [
                {"id": "root", "name": "R", "kind": "folder", "data": {"folder": true, "size": 0}},
                {"id": "a", "name": "A", "kind": "folder", "parentId": "b", "children": ["b"], "data": {"folder": true, "size": 0}},
                {"id": "b", "name": "B", "kind": "folder", "parentId": "a", "children": ["a"], "data": {"folder": true, "size": 0}},
            ]
        });
        assert!(matches!(
            Tree::<Doc>::from_json(json),
            Err(SerializeError::Unreachable(2))
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_missing_root() {
        let dup = json!({
            "rootId": "root",
            "nodes": [
                {"id": "root", "name": "R", "kind": "folder", "data": {"folder": true, "size": 0}},
                {"id": "root", "name": "R", "kind": "folder", "data": {"folder": true, "size": 0}},
            ]
        });
        assert!(matches!(Tree::<Doc>::from_json(dup), Err(SerializeError::DuplicateId(_))));

        let no_root = json!({"rootId": "x", "nodes": []});
        assert!(matches!(Tree::<Doc>::from_json(no_root), Err(SerializeError::MissingRoot(_))));
    }

    #[test]
    fn test_deep_round_trip() {
        let mut tree = Tree::new(Node::new("root", "Root", Doc { folder: true, size: 0 }));
        let mut parent = "root".to_string();
        for i in 0..3_000 {
            let id = format!("n{i}");
            assert!(tree.insert(&parent, Node::new(id.clone(), id.clone(), Doc { folder: true, size: 0 })));
            parent = id;
        }
        let back: Tree<Doc> = Tree::from_json_str(&tree.to_json_string().unwrap()).unwrap();
        assert_eq!(back.len(), tree.len());
        assert_eq!(back.root().stats().folder_count, 3_000);
    }
}
