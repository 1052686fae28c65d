//! Document tree: the folder/document hierarchy the application works with.
//!
//! [`DocumentTree`] binds the generic [`Tree`] to [`Entry`] payloads. A
//! payload's label list is the source of truth; the node's structured label
//! set is re-derived from it whenever it changes.

use crate::config::TreeConfig;
use crate::entry::{Document, DocumentPatch, Entry, EntryPatch, Folder};
use crate::labels::{self, CatalogLabel};
use crate::node::{Node, NodeKind};
use crate::snapshot::Snapshot;
use crate::tree::{Detached, Tree};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Flattened result of a recursive folder walk.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecursiveContent<'a> {
    pub documents: Vec<&'a Document>,
    pub folders: Vec<&'a Folder>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FolderStats {
    pub total_items: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone)]
pub struct DocumentTree {
    tree: Tree<Entry>,
    default_label_color: String,
}

impl DocumentTree {
    /// Empty tree holding only the synthetic root.
    pub fn new(config: &TreeConfig) -> Self {
        let root = Node::new(
            config.root_id.clone(),
            config.root_name.clone(),
            Entry::Root {
                name: config.root_name.clone(),
            },
        );
        Self {
            tree: Tree::new(root),
            default_label_color: config.default_label_color.clone(),
        }
    }

    pub fn create_document(document: Document) -> Node<Entry> {
        let labels = labels::to_node_labels(&document.labels);
        Node::new(document.id.clone(), document.name.clone(), Entry::Document(document)).with_labels(labels)
    }

    pub fn create_folder(folder: Folder) -> Node<Entry> {
        let labels = labels::to_node_labels(&folder.labels);
        Node::new(folder.id.clone(), folder.name.clone(), Entry::Folder(folder)).with_labels(labels)
    }

    /// Build the whole tree from flat entity lists.
    ///
    /// Folders are wired first, then documents. A dangling or cyclic parent
    /// reference leaves the entity at the top level; a repeated id is skipped.
    pub fn build_root_tree(documents: Vec<Document>, folders: Vec<Folder>, config: &TreeConfig) -> Self {
        let mut this = Self::new(config);
        let root_id = this.tree.root_id().to_string();

        let mut declared = Vec::with_capacity(folders.len());
        for folder in folders {
            let id = folder.id.clone();
            let parent = folder.parent_id.clone();
            if !this.tree.insert(&root_id, Self::create_folder(folder)) {
                warn!(folder_id = %id, "skipping folder with duplicate id");
                continue;
            }
            declared.push((id, parent));
        }

        for (id, parent) in &declared {
            let Some(parent) = parent.as_deref() else {
                continue;
            };
            if parent == root_id {
                continue;
            }
            if !this.tree.get(parent).is_some_and(|p| p.is_folder()) {
                warn!(folder_id = %id, parent_id = %parent, "parent folder not found, placing at top level");
                continue;
            }
            if !this.tree.add_child(parent, id) {
                warn!(folder_id = %id, parent_id = %parent, "folder parent would create a cycle, placing at top level");
            }
        }

        let document_count = documents.len();
        for document in documents {
            let id = document.id.clone();
            let target = match document.folder_id.as_deref() {
                Some(folder_id) if this.tree.get(folder_id).is_some_and(|f| f.is_folder()) => folder_id.to_string(),
                Some(folder_id) => {
                    warn!(document_id = %id, folder_id, "folder not found, placing document at top level");
                    root_id.clone()
                }
                None => root_id.clone(),
            };
            if !this.tree.insert(&target, Self::create_document(document)) {
                warn!(document_id = %id, "skipping document with duplicate id");
            }
        }

        this.tree.recompute_all();
        info!(
            folders = declared.len(),
            documents = document_count,
            nodes = this.tree.len(),
            "built document tree"
        );
        this
    }

    pub fn tree(&self) -> &Tree<Entry> {
        &self.tree
    }

    pub fn root_id(&self) -> &str {
        self.tree.root_id()
    }

    pub fn get(&self, id: &str) -> Option<&Node<Entry>> {
        self.tree.get(id)
    }

    /// Merge `patch` into the payload of `id`.
    ///
    /// Fails when the node is missing or the patch is for the other kind.
    pub fn update_data(&mut self, id: &str, patch: &EntryPatch) -> bool {
        let Some(node) = self.tree.get_mut(id) else {
            return false;
        };
        if !node.data.apply(patch) {
            debug!(node_id = id, kind = node.kind().as_str(), "patch does not match node kind");
            return false;
        }
        if let Some(name) = patch.renames() {
            node.name = name.to_string();
        }
        if patch.touches_labels() {
            self.sync_labels(id);
        } else {
            self.tree.refresh_stats(id);
        }
        true
    }

    pub fn update_node_fields(&mut self, id: &str, patch: impl Into<EntryPatch>) -> bool {
        let patch = patch.into();
        self.update_data(id, &patch)
    }

    /// Usage count of every label id in the subtree under `id`.
    pub fn label_usage(&self, id: &str) -> BTreeMap<String, usize> {
        let mut usage = BTreeMap::new();
        let Some(start) = self.tree.get(id) else {
            return usage;
        };
        for node in std::iter::once(start).chain(self.tree.descendants(id)) {
            for label in node.labels() {
                *usage.entry(label.id.clone()).or_insert(0) += 1;
            }
        }
        usage
    }

    /// Recompute the global label catalog from every payload in the tree.
    pub fn compute_label_catalog(
        &self,
        previous: &[CatalogLabel],
        custom: &[String],
        palette: &[String],
    ) -> Vec<CatalogLabel> {
        let root_id = self.tree.root_id();
        let nodes = std::iter::once(self.tree.root()).chain(self.tree.descendants(root_id));
        labels::compute_catalog(
            nodes.map(|n| n.data().labels()),
            previous,
            custom,
            palette,
            &self.default_label_color,
        )
    }

    /// Add `name` to the node's labels. False if already present or blank.
    pub fn add_label_to_node(&mut self, id: &str, name: &str) -> bool {
        let changed = self
            .tree
            .get_mut(id)
            .and_then(|n| n.data.labels_mut())
            .is_some_and(|list| labels::insert(list, name));
        if changed {
            self.sync_labels(id);
        }
        changed
    }

    /// Remove `name` from the node's labels. False if it was not there.
    pub fn remove_label_from_node(&mut self, id: &str, name: &str) -> bool {
        let changed = self
            .tree
            .get_mut(id)
            .and_then(|n| n.data.labels_mut())
            .is_some_and(|list| labels::remove(list, name));
        if changed {
            self.sync_labels(id);
        }
        changed
    }

    /// Remove `name` from every node carrying it; returns how many changed.
    pub fn purge_label_everywhere(&mut self, name: &str) -> usize {
        self.purge_label(name).len()
    }

    /// Ids of the nodes that carry `name`, in tree order.
    pub(crate) fn nodes_with_label(&self, name: &str) -> Vec<String> {
        let name = name.trim();
        self.tree
            .descendants(self.tree.root_id())
            .into_iter()
            .filter(|n| n.data().labels().iter().any(|l| l == name))
            .map(|n| n.id().to_string())
            .collect()
    }

    pub(crate) fn purge_label(&mut self, name: &str) -> Vec<String> {
        let impacted = self.nodes_with_label(name);
        for id in &impacted {
            self.remove_label_from_node(id, name);
        }
        impacted
    }

    /// Attach a new folder under its declared parent (or the root).
    ///
    /// If the id already exists the existing node is returned untouched.
    pub fn create_folder_node(&mut self, folder: Folder) -> Option<&Node<Entry>> {
        let id = folder.id.clone();
        if !self.tree.contains(&id) {
            let parent = self.placement(folder.parent_id.as_deref());
            if !self.tree.insert(&parent, Self::create_folder(folder)) {
                return None;
            }
            debug!(folder_id = %id, parent_id = %parent, "created folder node");
        }
        self.tree.get(&id)
    }

    pub fn create_document_node(&mut self, document: Document) -> Option<&Node<Entry>> {
        let id = document.id.clone();
        if !self.tree.contains(&id) {
            let parent = self.placement(document.folder_id.as_deref());
            if !self.tree.insert(&parent, Self::create_document(document)) {
                return None;
            }
            debug!(document_id = %id, parent_id = %parent, "created document node");
        }
        self.tree.get(&id)
    }

    /// Set the favorite flag of a document. Folders have none.
    pub fn toggle_favorite(&mut self, id: &str, value: bool) -> bool {
        if !self.tree.get(id).is_some_and(|n| n.kind() == NodeKind::File) {
            return false;
        }
        self.update_data(id, &DocumentPatch::favorite(value).into())
    }

    /// Move `id` under `target` (`None` for the top level).
    ///
    /// Moving to the current parent succeeds without changing anything.
    pub fn relocate_node(&mut self, id: &str, target: Option<&str>) -> bool {
        let target = target.unwrap_or(self.tree.root_id()).to_string();
        let Some(node) = self.tree.get(id) else {
            return false;
        };
        if node.parent_id() == Some(target.as_str()) {
            return true;
        }
        self.tree.add_child(&target, id)
    }

    /// Detach `id` and its subtree.
    pub fn remove_node(&mut self, id: &str) -> Option<Detached<Entry>> {
        self.tree.detach(id)
    }

    /// Root-first path to `id`.
    pub fn path(&self, id: &str) -> Vec<&Node<Entry>> {
        self.tree.path(id)
    }

    /// Folders directly under `parent` (`None` for the top level) carrying
    /// every label in `filter`.
    pub fn list_folders(&self, parent: Option<&str>, filter: &[String]) -> Vec<&Folder> {
        let parent = parent.unwrap_or(self.tree.root_id());
        self.tree
            .children_of(parent)
            .into_iter()
            .filter_map(|n| n.data().as_folder())
            .filter(|f| labels::contains_all(&f.labels, filter))
            .collect()
    }

    /// Everything under `folder_id` (`None` for the root) that passes
    /// `filter`. A node that fails the filter hides its whole branch.
    pub fn recursive_content(&self, folder_id: Option<&str>, filter: &[String]) -> RecursiveContent<'_> {
        let mut content = RecursiveContent::default();
        let start = folder_id.unwrap_or(self.tree.root_id());
        let Some(start) = self.tree.get(start) else {
            return content;
        };

        let mut visited = HashSet::new();
        visited.insert(start.id());
        let mut stack: Vec<&str> = start.children().iter().rev().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.tree.get(id) else {
                continue;
            };
            if !labels::contains_all(node.data().labels(), filter) {
                continue;
            }
            match node.data() {
                Entry::Document(d) => content.documents.push(d),
                Entry::Folder(f) => {
                    content.folders.push(f);
                    stack.extend(node.children().iter().rev().map(String::as_str));
                }
                Entry::Root { .. } => {}
            }
        }
        content
    }

    pub fn compute_folder_stats(&self, folder_id: Option<&str>) -> FolderStats {
        let content = self.recursive_content(folder_id, &[]);
        FolderStats {
            total_items: content.documents.len() + content.folders.len(),
            total_size: content.documents.iter().map(|d| d.size).sum(),
        }
    }

    pub fn print_tree(&self) -> String {
        self.tree.render_with(self.tree.root_id(), |node| match node.data() {
            Entry::Document(d) => format!("{} ({} bytes)", node.name(), d.size),
            _ => format!("{}/", node.name()),
        })
    }

    /// Put a node back to the state captured in `snapshot`.
    ///
    /// If the former parent can no longer take the node (gone, or the move
    /// would close a cycle) the node keeps its current position and the
    /// payload's parent pointer is rewritten to match it.
    pub(crate) fn restore(&mut self, snapshot: &Snapshot<Entry>) -> bool {
        let id = snapshot.id.as_str();
        let Some(node) = self.tree.get_mut(id) else {
            return false;
        };
        node.data = snapshot.payload.clone();
        node.name = snapshot.payload.name().to_string();
        let current_parent = node.parent_id.clone();
        self.tree.set_labels(id, snapshot.labels.clone());

        if let Some(parent) = snapshot.parent_id.as_deref() {
            if current_parent.as_deref() != Some(parent) && !self.tree.add_child(parent, id) {
                warn!(node_id = id, parent_id = parent, "could not move node back to its former parent");
                self.tree.sync_payload_parent(id);
            }
        }
        true
    }

    /// Re-insert a removed subtree under its former parent, or the root if
    /// that parent is gone.
    pub(crate) fn reattach(&mut self, detached: Detached<Entry>) -> Result<(), Detached<Entry>> {
        let parent = detached
            .former_parent_id()
            .filter(|p| self.tree.get(p).is_some_and(|n| n.is_folder()))
            .unwrap_or(self.tree.root_id())
            .to_string();
        self.tree.attach(&parent, detached)
    }

    fn sync_labels(&mut self, id: &str) {
        let derived = match self.tree.get(id) {
            Some(node) => labels::to_node_labels(node.data().labels()),
            None => return,
        };
        self.tree.set_labels(id, derived);
    }

    /// Where a new entity with the declared parent goes.
    fn placement(&self, declared: Option<&str>) -> String {
        match declared {
            Some(parent) if self.tree.get(parent).is_some_and(|p| p.is_folder()) => parent.to_string(),
            _ => self.tree.root_id().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FolderPatch;
    use crate::snapshot::SnapshotStore;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn child_ids(tree: &DocumentTree, id: &str) -> Vec<String> {
        tree.get(id).unwrap().children().to_vec()
    }

    /// root ─ f1 ─ f2 ─ d2(3)
    ///         └ d1(10, work)
    ///      └ d3(1, work,home)
    fn library() -> DocumentTree {
        DocumentTree::build_root_tree(
            vec![
                Document::new("d1", "Plan").in_folder("f1").with_size(10).with_labels("work"),
                Document::new("d2", "Draft").in_folder("f2").with_size(3),
                Document::new("d3", "Loose").with_size(1).with_labels("work,home"),
            ],
            vec![
                Folder::new("f2", "Inner").under("f1"),
                Folder::new("f1", "Outer").with_labels("work"),
            ],
            &TreeConfig::default(),
        )
    }

    #[test]
    fn test_build_wires_folders_then_documents() {
        let tree = DocumentTree::build_root_tree(
            vec![Document::new("d1", "Doc").in_folder("f1").with_size(10)],
            vec![Folder::new("f1", "Folder")],
            &TreeConfig::default(),
        );

        assert_eq!(child_ids(&tree, "root"), names(&["f1"]));
        assert_eq!(child_ids(&tree, "f1"), names(&["d1"]));
        assert_eq!(tree.get("f1").unwrap().stats().total_size, 10);
    }

    #[test]
    fn test_build_routes_orphans_and_cycles_to_root() {
        let tree = DocumentTree::build_root_tree(
            vec![
                Document::new("d1", "Lost").in_folder("nowhere"),
                Document::new("d1", "Dup"),
            ],
            vec![
                Folder::new("a", "A").under("b"),
                Folder::new("b", "B").under("a"),
                Folder::new("c", "C").under("ghost"),
            ],
            &TreeConfig::default(),
        );

        // a goes under b, then b cannot go under a
        assert_eq!(tree.get("a").unwrap().parent_id(), Some("b"));
        assert_eq!(tree.get("b").unwrap().parent_id(), Some("root"));
        assert_eq!(tree.get("c").unwrap().parent_id(), Some("root"));
        assert_eq!(tree.get("c").unwrap().data().as_folder().unwrap().parent_id, None);
        assert_eq!(tree.get("d1").unwrap().parent_id(), Some("root"));
        assert_eq!(tree.get("d1").unwrap().name(), "Lost");
        assert_eq!(tree.tree().len(), 5);
    }

    #[test]
    fn test_nested_stats_reach_root() {
        let tree = library();
        let f1 = tree.get("f1").unwrap().stats();
        assert_eq!((f1.total_size, f1.file_count, f1.folder_count), (13, 2, 1));
        let root = tree.tree().root().stats();
        assert_eq!(root.total_size, 14);
        assert_eq!(root.total_items, 5);
        // f1 + d1 + d3 (2)
        assert_eq!(root.label_count, 4);
    }

    #[test]
    fn test_label_add_is_idempotent_and_remove_missing_fails() {
        let mut tree = library();
        assert!(tree.add_label_to_node("d2", "urgent"));
        assert!(!tree.add_label_to_node("d2", "urgent"));
        assert!(!tree.remove_label_from_node("d2", "missing"));
        assert!(!tree.add_label_to_node("nope", "urgent"));

        let d2 = tree.get("d2").unwrap();
        assert_eq!(d2.data().labels(), &names(&["urgent"]));
        assert!(d2.has_label("urgent"));
        assert_eq!(tree.get("f2").unwrap().stats().label_count, 1);
    }

    #[test]
    fn test_relocate_into_descendant_is_rejected() {
        let mut tree = library();
        let before = tree.print_tree();

        assert!(!tree.relocate_node("f1", Some("f2")));
        assert_eq!(tree.print_tree(), before);
        assert!(tree.relocate_node("f1", None));
        assert_eq!(tree.print_tree(), before);
    }

    #[test]
    fn test_relocate_updates_payload_pointer() {
        let mut tree = library();
        assert!(tree.relocate_node("d3", Some("f2")));
        assert_eq!(tree.get("d3").unwrap().data().as_document().unwrap().folder_id.as_deref(), Some("f2"));
        assert_eq!(tree.get("f2").unwrap().stats().total_size, 4);

        assert!(tree.relocate_node("f2", None));
        assert_eq!(tree.get("f2").unwrap().data().as_folder().unwrap().parent_id, None);
        assert!(!tree.relocate_node("d1", Some("d2")));
    }

    #[test]
    fn test_update_fields_renames_and_relabels() {
        let mut tree = library();
        let patch = FolderPatch {
            labels: Some(names(&["x", "y"])),
            ..FolderPatch::name("Renamed")
        };
        assert!(tree.update_node_fields("f2", patch));
        let f2 = tree.get("f2").unwrap();
        assert_eq!(f2.name(), "Renamed");
        assert_eq!(f2.labels().len(), 2);

        assert!(!tree.update_node_fields("f2", DocumentPatch::name("nope")));
        assert!(!tree.update_node_fields("missing", FolderPatch::name("nope")));
        assert!(!tree.update_node_fields("root", FolderPatch::name("nope")));
    }

    #[test]
    fn test_favorite_only_for_documents() {
        let mut tree = library();
        assert!(tree.toggle_favorite("d1", true));
        assert!(tree.get("d1").unwrap().data().as_document().unwrap().favorite);
        assert!(tree.toggle_favorite("d1", true));
        assert!(!tree.toggle_favorite("f1", true));
    }

    #[test]
    fn test_purge_label_everywhere() {
        let mut tree = library();
        assert_eq!(tree.purge_label_everywhere("work"), 3);
        assert_eq!(tree.purge_label_everywhere("work"), 0);
        assert!(tree.label_usage("root").get("work").is_none());
        assert_eq!(tree.label_usage("root").get("home"), Some(&1));
    }

    #[test]
    fn test_create_nodes_are_idempotent() {
        let mut tree = library();
        let existing = tree.create_folder_node(Folder::new("f1", "Other")).unwrap();
        assert_eq!(existing.name(), "Outer");

        let created = tree.create_document_node(Document::new("d9", "New").in_folder("f2").with_size(2));
        assert_eq!(created.unwrap().parent_id(), Some("f2"));
        assert_eq!(tree.get("f1").unwrap().stats().total_size, 15);

        let stray = tree.create_folder_node(Folder::new("f9", "Stray").under("d1")).unwrap();
        assert_eq!(stray.parent_id(), Some("root"));
    }

    #[test]
    fn test_listing_and_recursive_content() {
        let tree = library();
        let top: Vec<_> = tree.list_folders(None, &[]).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(top, vec!["f1"]);
        assert!(tree.list_folders(Some("f1"), &names(&["work"])).is_empty());

        let all = tree.recursive_content(None, &[]);
        assert_eq!(all.documents.len(), 3);
        assert_eq!(all.folders.len(), 2);

        // f2 lacks "work", so d2 below it is pruned too
        let work = tree.recursive_content(None, &names(&["work"]));
        let docs: Vec<_> = work.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(docs, vec!["d1", "d3"]);

        assert_eq!(tree.recursive_content(Some("missing"), &[]), RecursiveContent::default());
        assert_eq!(
            tree.compute_folder_stats(Some("f1")),
            FolderStats { total_items: 3, total_size: 13 }
        );
    }

    #[test]
    fn test_path_and_print() {
        let tree = library();
        let path: Vec<_> = tree.path("d2").iter().map(|n| n.id()).collect();
        assert_eq!(path, vec!["root", "f1", "f2", "d2"]);
        assert_eq!(
            tree.print_tree(),
            "Root/\n├── Outer/\n│   ├── Inner/\n│   │   └── Draft (3 bytes)\n│   └── Plan (10 bytes)\n└── Loose (1 bytes)\n"
        );
    }

    #[test]
    fn test_catalog_is_deterministic() {
        let tree = library();
        let palette = names(&["#111111", "#222222"]);
        let first = tree.compute_label_catalog(&[], &names(&["later"]), &palette);
        let second = tree.compute_label_catalog(&[], &names(&["later"]), &palette);
        assert_eq!(first, second);
        let order: Vec<_> = first.iter().map(|l| (l.name.as_str(), l.count)).collect();
        assert_eq!(order, vec![("work", 3), ("home", 1), ("later", 0)]);
    }

    #[test]
    fn test_restore_and_reattach() {
        let mut tree = library();
        let mut store = SnapshotStore::new();
        store.take(tree.get("d1").unwrap());

        assert!(tree.update_node_fields("d1", DocumentPatch::name("Changed")));
        assert!(tree.add_label_to_node("d1", "extra"));
        assert!(tree.relocate_node("d1", Some("f2")));

        assert!(tree.restore(&store.pop("d1").unwrap()));
        let d1 = tree.get("d1").unwrap();
        assert_eq!(d1.name(), "Plan");
        assert_eq!(d1.parent_id(), Some("f1"));
        assert_eq!(d1.data().labels(), &names(&["work"]));
        assert_eq!(tree.get("f2").unwrap().stats().total_size, 3);

        let removed = tree.remove_node("f2").unwrap();
        assert!(tree.get("d2").is_none());
        assert!(tree.reattach(removed).is_ok());
        assert_eq!(tree.get("d2").unwrap().parent_id(), Some("f2"));
        assert_eq!(tree.get("f1").unwrap().stats().total_size, 13);
    }

    #[test]
    fn test_restore_keeps_payload_parent_when_former_parent_is_gone() {
        let mut tree = library();
        let mut store = SnapshotStore::new();
        store.take(tree.get("d1").unwrap());

        assert!(tree.relocate_node("d1", None));
        assert!(tree.remove_node("f1").is_some());

        assert!(tree.restore(&store.pop("d1").unwrap()));
        let d1 = tree.get("d1").unwrap();
        assert_eq!(d1.parent_id(), Some("root"));
        assert_eq!(d1.data().as_document().unwrap().folder_id, None);
    }

    #[test]
    fn test_restore_keeps_payload_parent_when_move_back_is_a_cycle() {
        let mut tree = library();
        let mut store = SnapshotStore::new();
        store.take(tree.get("f1").unwrap());

        assert!(tree.create_folder_node(Folder::new("f3", "Third")).is_some());
        assert!(tree.relocate_node("f1", Some("f3")));

        // f2 sits under f1, so moving f1 back under it is refused
        let snapshot = store.pop("f1").unwrap();
        assert!(tree.restore(&Snapshot {
            parent_id: Some("f2".into()),
            ..snapshot
        }));
        let f1 = tree.get("f1").unwrap();
        assert_eq!(f1.parent_id(), Some("f3"));
        assert_eq!(f1.data().as_folder().unwrap().parent_id.as_deref(), Some("f3"));
    }
}
