//! Optimistic synchronization of a [`DocumentTree`] with a remote authority.
//!
//! Every mutation is applied to the local tree before the method returns.
//! The matching remote call then runs on a background task, ordered per node
//! id by a [`KeyedQueue`]. When the remote rejects the call the node is put
//! back from its snapshot and rollback listeners are notified.
//!
//! Mutating methods must be called from within a Tokio runtime.

use crate::domain::DocumentTree;
use crate::entry::{Document, Entry, EntryPatch, Folder};
use crate::events::{EventBus, RollbackNotice, Subscription, TreeEvent};
use crate::labels;
use crate::node::{Node, NodeKind};
use crate::queue::KeyedQueue;
use crate::remote::{self, DocumentUpdate, FolderUpdate, RemoteApi, RemoteOperation};
use crate::snapshot::SnapshotStore;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

struct SyncState {
    tree: DocumentTree,
    snapshots: SnapshotStore<Entry>,
}

pub struct OptimisticTree<R> {
    state: Arc<Mutex<SyncState>>,
    remote: Arc<R>,
    events: Arc<EventBus>,
    queue: KeyedQueue,
}

impl<R: RemoteApi + 'static> OptimisticTree<R> {
    pub fn new(tree: DocumentTree, remote: R) -> Self {
        Self {
            state: Arc::new(Mutex::new(SyncState {
                tree,
                snapshots: SnapshotStore::new(),
            })),
            remote: Arc::new(remote),
            events: Arc::new(EventBus::new()),
            queue: KeyedQueue::new(),
        }
    }

    /// Run `f` against the current local tree.
    pub fn read<O>(&self, f: impl FnOnce(&DocumentTree) -> O) -> O {
        f(&lock(&self.state).tree)
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn subscribe(&self, callback: impl Fn(&TreeEvent) + Send + Sync + 'static) -> Subscription {
        self.events.subscribe(callback)
    }

    pub fn on_rollback(&self, callback: impl Fn(RollbackNotice) + Send + Sync + 'static) -> Subscription {
        self.events.on_rollback(callback)
    }

    /// Wait for every remote call issued so far. Nothing is cancelled.
    pub async fn settle(&self) {
        self.queue.settle().await;
    }

    /// Snapshots still waiting for their remote call to settle.
    pub fn pending_snapshots(&self) -> usize {
        lock(&self.state).snapshots.len()
    }

    pub fn update_node_fields(&self, id: &str, patch: impl Into<EntryPatch>) -> bool {
        let patch = patch.into();
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let Some(node) = state.tree.get(id) else {
            return false;
        };
        let version = state.snapshots.take(node);
        if !state.tree.update_data(id, &patch) {
            state.snapshots.discard(id, version);
            return false;
        }
        let Some(operation) = state.tree.get(id).map(|node| field_update(&patch, node)) else {
            return true;
        };
        drop(guard);

        self.dispatch(id, version, operation);
        true
    }

    pub fn toggle_favorite(&self, id: &str, value: bool) -> bool {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let Some(node) = state.tree.get(id).filter(|n| n.kind() == NodeKind::File) else {
            return false;
        };
        let version = state.snapshots.take(node);
        if !state.tree.toggle_favorite(id, value) {
            state.snapshots.discard(id, version);
            return false;
        }
        drop(guard);

        self.dispatch(id, version, RemoteOperation::UpdateDocument(DocumentUpdate::favorite(value)));
        true
    }

    /// Move `id` under `target` (`None` for the top level).
    pub fn relocate_node(&self, id: &str, target: Option<&str>) -> bool {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let root_id = state.tree.root_id().to_string();
        let Some(node) = state.tree.get(id) else {
            return false;
        };
        if node.parent_id() == Some(target.unwrap_or(root_id.as_str())) {
            return true;
        }
        let kind = node.kind();
        let version = state.snapshots.take(node);
        if !state.tree.relocate_node(id, target) {
            state.snapshots.discard(id, version);
            return false;
        }
        drop(guard);

        let remote_parent = target.filter(|t| *t != root_id);
        let operation = match kind {
            NodeKind::File => RemoteOperation::MoveDocument {
                folder_id: remote_parent.map(str::to_string),
            },
            NodeKind::Folder => RemoteOperation::UpdateFolder(FolderUpdate::parent(remote_parent)),
        };
        self.dispatch(id, version, operation);
        true
    }

    pub fn add_label_to_node(&self, id: &str, name: &str) -> bool {
        self.change_labels(id, |tree| tree.add_label_to_node(id, name))
    }

    pub fn remove_label_from_node(&self, id: &str, name: &str) -> bool {
        self.change_labels(id, |tree| tree.remove_label_from_node(id, name))
    }

    /// Remove `name` from every node. All impacted nodes are pushed to the
    /// remote in one background task; if any call fails, every impacted
    /// node is rolled back.
    pub fn purge_label_everywhere(&self, name: &str) -> usize {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let mut versions = Vec::new();
        for id in state.tree.nodes_with_label(name) {
            if let Some(node) = state.tree.get(&id) {
                let version = state.snapshots.take(node);
                versions.push((id, version));
            }
        }
        state.tree.purge_label(name);
        let batch: Vec<(String, u64, RemoteOperation)> = versions
            .into_iter()
            .filter_map(|(id, version)| {
                let operation = state.tree.get(&id).and_then(labels_update)?;
                Some((id, version, operation))
            })
            .collect();
        drop(guard);

        let count = batch.len();
        if count == 0 {
            return 0;
        }
        debug!(label = name, nodes = count, "dispatching label purge");

        let keys: Vec<String> = batch.iter().map(|(id, _, _)| id.clone()).collect();
        let label = name.to_string();
        let state = Arc::clone(&self.state);
        let remote = Arc::clone(&self.remote);
        let events = Arc::clone(&self.events);
        self.queue.enqueue(keys, async move {
            let mut failure = None;
            for (id, _, operation) in &batch {
                if let Err(error) = call_remote(&*remote, id, operation.clone()).await {
                    failure = Some((id.clone(), error));
                    break;
                }
            }

            let outcome: Vec<TreeEvent> = {
                let mut guard = lock(&state);
                let state = &mut *guard;
                match &failure {
                    None => batch
                        .iter()
                        .map(|(id, version, operation)| {
                            state.snapshots.discard(id, *version);
                            TreeEvent::confirmed(id, operation.name())
                        })
                        .collect(),
                    Some((failed_id, error)) => batch
                        .iter()
                        .filter(|(id, _, _)| {
                            state
                                .snapshots
                                .pop(id)
                                .is_some_and(|snapshot| state.tree.restore(&snapshot))
                        })
                        .map(|(id, _, _)| TreeEvent::rolled_back(id, format!("{failed_id}: {error}")))
                        .collect(),
                }
            };
            match &failure {
                None => info!(label = %label, nodes = outcome.len(), "label purge confirmed"),
                Some((failed_id, error)) => {
                    warn!(label = %label, node_id = %failed_id, %error, "label purge rejected, rolling back")
                }
            }
            events.emit_all(outcome);
        });
        count
    }

    /// Detach `id` and its subtree now; re-attach it if the remote refuses.
    pub fn delete_node(&self, id: &str) -> bool {
        let detached = {
            let mut guard = lock(&self.state);
            match guard.tree.remove_node(id) {
                Some(detached) => detached,
                None => return false,
            }
        };
        let operation = match detached.root().map(|n| n.kind()) {
            Some(NodeKind::File) => RemoteOperation::DeleteDocument,
            _ => RemoteOperation::DeleteFolder,
        };
        let keys: Vec<String> = detached.ids().map(str::to_string).collect();
        debug!(node_id = id, operation = operation.name(), nodes = keys.len(), "dispatching delete");

        let id = id.to_string();
        let state = Arc::clone(&self.state);
        let remote = Arc::clone(&self.remote);
        let events = Arc::clone(&self.events);
        self.queue.enqueue(keys, async move {
            let name = operation.name();
            match call_remote(&*remote, &id, operation).await {
                Ok(()) => events.emit(TreeEvent::confirmed(&id, name)),
                Err(error) => {
                    warn!(node_id = %id, %error, "delete rejected, re-attaching");
                    let reattached = lock(&state).tree.reattach(detached);
                    match reattached {
                        Ok(()) => events.emit(TreeEvent::rolled_back(&id, error.to_string())),
                        Err(detached) => {
                            warn!(node_id = %detached.root_id(), "could not re-attach deleted subtree")
                        }
                    }
                }
            }
        });
        true
    }

    /// Local only: entities reach the tree after the remote created them.
    pub fn create_folder_node(&self, folder: Folder) -> bool {
        lock(&self.state).tree.create_folder_node(folder).is_some()
    }

    /// Local only, like [`create_folder_node`](Self::create_folder_node).
    pub fn create_document_node(&self, document: Document) -> bool {
        lock(&self.state).tree.create_document_node(document).is_some()
    }

    fn change_labels(&self, id: &str, change: impl FnOnce(&mut DocumentTree) -> bool) -> bool {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        let Some(node) = state.tree.get(id) else {
            return false;
        };
        let version = state.snapshots.take(node);
        if !change(&mut state.tree) {
            state.snapshots.discard(id, version);
            return false;
        }
        let Some(operation) = state.tree.get(id).and_then(labels_update) else {
            return true;
        };
        drop(guard);

        self.dispatch(id, version, operation);
        true
    }

    fn dispatch(&self, id: &str, version: u64, operation: RemoteOperation) {
        debug!(node_id = id, operation = operation.name(), "dispatching remote call");
        let id = id.to_string();
        let state = Arc::clone(&self.state);
        let remote = Arc::clone(&self.remote);
        let events = Arc::clone(&self.events);
        self.queue.enqueue([id.clone()], async move {
            let name = operation.name();
            match call_remote(&*remote, &id, operation).await {
                Ok(()) => {
                    lock(&state).snapshots.discard(&id, version);
                    events.emit(TreeEvent::confirmed(&id, name));
                }
                Err(error) => {
                    warn!(node_id = %id, operation = name, %error, "remote rejected mutation, rolling back");
                    let restored = {
                        let mut guard = lock(&state);
                        let state = &mut *guard;
                        state
                            .snapshots
                            .pop(&id)
                            .is_some_and(|snapshot| state.tree.restore(&snapshot))
                    };
                    // An earlier rejection on this node already used the snapshot.
                    if restored {
                        events.emit(TreeEvent::rolled_back(&id, error.to_string()));
                    } else {
                        warn!(node_id = %id, "nothing to roll back");
                    }
                }
            }
        });
    }
}

/// Remote update for a field patch. Labels go out as the node stored them
/// after normalization, not as the caller wrote them.
fn field_update(patch: &EntryPatch, node: &Node<Entry>) -> RemoteOperation {
    let stored = patch.touches_labels().then(|| labels::join(node.data().labels()));
    match patch {
        EntryPatch::Document(p) => RemoteOperation::UpdateDocument(DocumentUpdate {
            labels: stored,
            ..DocumentUpdate::from_patch(p)
        }),
        EntryPatch::Folder(p) => RemoteOperation::UpdateFolder(FolderUpdate {
            labels: stored,
            ..FolderUpdate::from_patch(p)
        }),
    }
}

/// Full-label update for the node's remote kind; `None` for the root.
fn labels_update(node: &Node<Entry>) -> Option<RemoteOperation> {
    match node.data() {
        Entry::Document(d) => Some(RemoteOperation::UpdateDocument(DocumentUpdate::labels(&d.labels))),
        Entry::Folder(f) => Some(RemoteOperation::UpdateFolder(FolderUpdate::labels(&f.labels))),
        Entry::Root { .. } => None,
    }
}

async fn call_remote<R: RemoteApi + ?Sized>(
    remote: &R,
    id: &str,
    operation: RemoteOperation,
) -> remote::Result<()> {
    match operation {
        RemoteOperation::UpdateDocument(update) => remote.update_document(id, update).await,
        RemoteOperation::UpdateFolder(update) => remote.update_folder(id, update).await,
        RemoteOperation::MoveDocument { folder_id } => remote.move_document(id, folder_id.as_deref()).await,
        RemoteOperation::DeleteDocument => remote.delete_document(id).await,
        RemoteOperation::DeleteFolder => remote.delete_folder(id).await,
    }
}

fn lock(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::entry::DocumentPatch;
    use crate::remote::{InMemoryRemote, RemoteError};

    fn tree() -> OptimisticTree<Arc<InMemoryRemote>> {
        let docs = DocumentTree::build_root_tree(
            vec![Document::new("d1", "Before").in_folder("f1")],
            vec![Folder::new("f1", "Folder")],
            &TreeConfig::default(),
        );
        OptimisticTree::new(docs, Arc::new(InMemoryRemote::new()))
    }

    #[tokio::test]
    async fn test_confirmation_discards_snapshot() {
        let tree = tree();
        assert!(tree.update_node_fields("d1", DocumentPatch::name("After")));
        assert_eq!(tree.pending_snapshots(), 1);

        tree.settle().await;
        assert_eq!(tree.pending_snapshots(), 0);
        assert_eq!(tree.read(|t| t.get("d1").unwrap().name().to_string()), "After");
    }

    #[tokio::test]
    async fn test_local_failures_do_not_reach_remote() {
        let tree = tree();
        assert!(!tree.update_node_fields("missing", DocumentPatch::name("x")));
        assert!(!tree.update_node_fields("f1", DocumentPatch::name("x")));
        assert!(!tree.toggle_favorite("f1", true));
        assert!(!tree.relocate_node("f1", Some("d1")));
        assert!(tree.relocate_node("d1", Some("f1")));
        assert!(!tree.delete_node("root"));

        tree.settle().await;
        assert!(tree.remote().calls().is_empty());
        assert_eq!(tree.pending_snapshots(), 0);
    }

    #[tokio::test]
    async fn test_rejection_restores_snapshot() {
        let tree = tree();
        tree.remote().fail_next_call(RemoteError::Rejected("nope".into()));
        assert!(tree.toggle_favorite("d1", true));
        assert!(tree.read(|t| t.get("d1").unwrap().data().as_document().unwrap().favorite));

        tree.settle().await;
        assert!(!tree.read(|t| t.get("d1").unwrap().data().as_document().unwrap().favorite));
        assert_eq!(tree.pending_snapshots(), 0);
    }
}
