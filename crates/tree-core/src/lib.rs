//! tree-core: folder/document tree with optimistic remote synchronization.
//!
//! This crate provides:
//! - An arena-backed tree with O(1) lookup, cycle-safe moves and iterative traversals
//! - The document tree built on it (bulk construction, labels, queries)
//! - A label catalog computed from the canonical per-entity label lists
//! - Optimistic mutations with snapshots, per-node remote ordering and rollback
//! - The `RemoteApi` trait abstraction and an in-memory implementation

pub mod config;
pub mod domain;
pub mod entry;
pub mod events;
pub mod labels;
pub mod node;
pub mod optimistic;
pub mod queue;
pub mod remote;
pub mod serialize;
pub mod snapshot;
pub mod tree;

pub use config::{ConfigError, TreeConfig};
pub use domain::{DocumentTree, FolderStats, RecursiveContent};
pub use entry::{Document, DocumentPatch, Entry, EntryPatch, Folder, FolderPatch};
pub use events::{EventBus, RollbackNotice, Subscription, TreeEvent};
pub use labels::CatalogLabel;
pub use node::{Label, Node, NodeKind, Payload, Stats};
pub use optimistic::OptimisticTree;
pub use queue::KeyedQueue;
pub use remote::{
    DocumentUpdate, FolderUpdate, InMemoryRemote, RemoteApi, RemoteCall, RemoteError,
    RemoteOperation,
};
pub use serialize::SerializeError;
pub use snapshot::{Snapshot, SnapshotStore};
pub use tree::{Detached, Tree};
