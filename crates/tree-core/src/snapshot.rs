//! Snapshot store: capture-before-mutate, restore-on-failure.
//!
//! One slot per node id. Each snapshot carries a version from a store-wide
//! counter so a confirmation can drop its own snapshot without clobbering a
//! newer one taken by a later mutation of the same node.

use crate::node::{Label, Node, Payload};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub id: String,
    pub payload: T,
    pub labels: Vec<Label>,
    pub parent_id: Option<String>,
    pub version: u64,
}

#[derive(Debug)]
pub struct SnapshotStore<T> {
    slots: HashMap<String, Snapshot<T>>,
    next_version: u64,
}

impl<T> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_version: 1,
        }
    }
}

impl<T: Payload> SnapshotStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `node`, replacing any earlier snapshot of the same id.
    pub fn take(&mut self, node: &Node<T>) -> u64 {
        let version = self.next_version;
        self.next_version += 1;
        self.slots.insert(
            node.id().to_string(),
            Snapshot {
                id: node.id().to_string(),
                payload: node.data().clone(),
                labels: node.labels().to_vec(),
                parent_id: node.parent_id().map(str::to_string),
                version,
            },
        );
        version
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot<T>> {
        self.slots.get(id)
    }

    pub fn pop(&mut self, id: &str) -> Option<Snapshot<T>> {
        self.slots.remove(id)
    }

    /// Drop the snapshot for `id` only if it is still the one at `version`.
    pub fn discard(&mut self, id: &str, version: u64) -> bool {
        match self.slots.get(id) {
            Some(snapshot) if snapshot.version == version => {
                self.slots.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
