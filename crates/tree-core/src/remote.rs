//! Remote authority abstraction.
//!
//! The tree talks to exactly five remote operations. Implementations:
//! - `InMemoryRemote` - For testing (scripted failures, latency, pause/resume)
//! - an HTTP client in the application layer

use crate::entry::{DocumentPatch, FolderPatch};
use crate::labels;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Rejected by remote: {0}")]
    Rejected(String),

    #[error("Not found on remote: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Fields the remote accepts for a document. Labels travel as the full
/// canonical string, never as a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

impl DocumentUpdate {
    /// Restrict a local patch to the remote field set (size is local-only).
    pub fn from_patch(patch: &DocumentPatch) -> Self {
        Self {
            name: patch.name.clone(),
            doc_type: patch.doc_type.clone(),
            description: patch.description.clone(),
            labels: patch.labels.clone().map(canonical_labels),
            favorite: patch.favorite,
        }
    }

    pub fn labels(names: &[String]) -> Self {
        Self {
            labels: Some(labels::join(names)),
            ..Self::default()
        }
    }

    pub fn favorite(value: bool) -> Self {
        Self {
            favorite: Some(value),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// `Some(None)` moves the folder to the top level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
}

impl FolderUpdate {
    pub fn from_patch(patch: &FolderPatch) -> Self {
        Self {
            name: patch.name.clone(),
            description: patch.description.clone(),
            color: patch.color.clone(),
            parent_id: None,
            labels: patch.labels.clone().map(canonical_labels),
        }
    }

    pub fn labels(names: &[String]) -> Self {
        Self {
            labels: Some(labels::join(names)),
            ..Self::default()
        }
    }

    pub fn parent(parent_id: Option<&str>) -> Self {
        Self {
            parent_id: Some(parent_id.map(str::to_string)),
            ..Self::default()
        }
    }
}

fn canonical_labels(names: Vec<String>) -> String {
    labels::join(&labels::normalize(names))
}

/// The remote operations the tree depends on. Only success or failure
/// matters; no response payload is read.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn update_document(&self, id: &str, update: DocumentUpdate) -> Result<()>;

    async fn update_folder(&self, id: &str, update: FolderUpdate) -> Result<()>;

    /// `folder_id = None` moves the document to the top level.
    async fn move_document(&self, id: &str, folder_id: Option<&str>) -> Result<()>;

    async fn delete_document(&self, id: &str) -> Result<()>;

    async fn delete_folder(&self, id: &str) -> Result<()>;
}

// Lets the caller keep a handle to a shared remote (e.g. to script an
// InMemoryRemote while the tree owns it).
#[async_trait]
impl<T: RemoteApi + ?Sized> RemoteApi for std::sync::Arc<T> {
    async fn update_document(&self, id: &str, update: DocumentUpdate) -> Result<()> {
        (**self).update_document(id, update).await
    }

    async fn update_folder(&self, id: &str, update: FolderUpdate) -> Result<()> {
        (**self).update_folder(id, update).await
    }

    async fn move_document(&self, id: &str, folder_id: Option<&str>) -> Result<()> {
        (**self).move_document(id, folder_id).await
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        (**self).delete_document(id).await
    }

    async fn delete_folder(&self, id: &str) -> Result<()> {
        (**self).delete_folder(id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOperation {
    UpdateDocument(DocumentUpdate),
    UpdateFolder(FolderUpdate),
    MoveDocument { folder_id: Option<String> },
    DeleteDocument,
    DeleteFolder,
}

impl RemoteOperation {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteOperation::UpdateDocument(_) => "updateDocument",
            RemoteOperation::UpdateFolder(_) => "updateFolder",
            RemoteOperation::MoveDocument { .. } => "moveDocument",
            RemoteOperation::DeleteDocument => "deleteDocument",
            RemoteOperation::DeleteFolder => "deleteFolder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub id: String,
    pub operation: RemoteOperation,
}

type Record = serde_json::Map<String, serde_json::Value>;

/// In-memory remote for testing.
///
/// Keeps a merged field map per id, the log of calls in arrival order and
/// the log of calls in the order they were applied.
pub struct InMemoryRemote {
    calls: Mutex<Vec<RemoteCall>>,
    applied: Mutex<Vec<RemoteCall>>,
    records: Mutex<HashMap<String, Record>>,
    deleted: Mutex<HashSet<String>>,
    fail_next: Mutex<VecDeque<RemoteError>>,
    fail_ids: Mutex<HashMap<String, RemoteError>>,
    delays: Mutex<VecDeque<Duration>>,
    gate: watch::Sender<bool>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            calls: Mutex::new(Vec::new()),
            applied: Mutex::new(Vec::new()),
            records: Mutex::new(HashMap::new()),
            deleted: Mutex::new(HashSet::new()),
            fail_next: Mutex::new(VecDeque::new()),
            fail_ids: Mutex::new(HashMap::new()),
            delays: Mutex::new(VecDeque::new()),
            gate,
        }
    }

    /// The next call to arrive fails with `error`. Stacks.
    pub fn fail_next_call(&self, error: RemoteError) {
        lock(&self.fail_next).push_back(error);
    }

    /// Every call for `id` fails with `error` until cleared.
    pub fn fail_for_id(&self, id: &str, error: RemoteError) {
        lock(&self.fail_ids).insert(id.to_string(), error);
    }

    pub fn clear_failures(&self) {
        lock(&self.fail_next).clear();
        lock(&self.fail_ids).clear();
    }

    /// Latency for the next call to arrive. Stacks.
    pub fn push_delay(&self, delay: Duration) {
        lock(&self.delays).push_back(delay);
    }

    /// Hold every call (arrived or future) until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.send_replace(true);
    }

    pub fn resume(&self) {
        self.gate.send_replace(false);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    pub fn applied(&self) -> Vec<RemoteCall> {
        lock(&self.applied).clone()
    }

    /// Current server-side value of `field` for `id`.
    pub fn field(&self, id: &str, field: &str) -> Option<serde_json::Value> {
        lock(&self.records).get(id).and_then(|r| r.get(field).cloned())
    }

    pub fn is_deleted(&self, id: &str) -> bool {
        lock(&self.deleted).contains(id)
    }

    async fn handle(&self, id: &str, operation: RemoteOperation) -> Result<()> {
        let call = RemoteCall {
            id: id.to_string(),
            operation,
        };
        lock(&self.calls).push(call.clone());
        let failure = lock(&self.fail_next)
            .pop_front()
            .or_else(|| lock(&self.fail_ids).get(id).cloned());
        let delay = lock(&self.delays).pop_front();

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|paused| !*paused).await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = failure {
            debug!(id, operation = call.operation.name(), %error, "remote call failed");
            return Err(error);
        }
        self.apply(&call);
        lock(&self.applied).push(call);
        Ok(())
    }

    fn apply(&self, call: &RemoteCall) {
        let mut records = lock(&self.records);
        let fields = match &call.operation {
            RemoteOperation::UpdateDocument(update) => serde_json::to_value(update).ok(),
            RemoteOperation::UpdateFolder(update) => serde_json::to_value(update).ok(),
            RemoteOperation::MoveDocument { folder_id } => {
                Some(serde_json::json!({ "folderId": folder_id }))
            }
            RemoteOperation::DeleteDocument | RemoteOperation::DeleteFolder => {
                records.remove(&call.id);
                lock(&self.deleted).insert(call.id.clone());
                return;
            }
        };
        if let Some(serde_json::Value::Object(fields)) = fields {
            records.entry(call.id.clone()).or_default().extend(fields);
        }
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn update_document(&self, id: &str, update: DocumentUpdate) -> Result<()> {
        self.handle(id, RemoteOperation::UpdateDocument(update)).await
    }

    async fn update_folder(&self, id: &str, update: FolderUpdate) -> Result<()> {
        self.handle(id, RemoteOperation::UpdateFolder(update)).await
    }

    async fn move_document(&self, id: &str, folder_id: Option<&str>) -> Result<()> {
        let folder_id = folder_id.map(str::to_string);
        self.handle(id, RemoteOperation::MoveDocument { folder_id }).await
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.handle(id, RemoteOperation::DeleteDocument).await
    }

    async fn delete_folder(&self, id: &str) -> Result<()> {
        self.handle(id, RemoteOperation::DeleteFolder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_updates_carry_only_remote_fields() {
        let patch = DocumentPatch {
            labels: Some(vec!["a".into(), "b".into()]),
            size: Some(99),
            ..DocumentPatch::name("Doc")
        };
        let update = DocumentUpdate::from_patch(&patch);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"name": "Doc", "labels": "a,b"})
        );

        let messy = FolderPatch {
            labels: Some(vec![" a ".into(), "a".into(), String::new(), "b".into()]),
            ..FolderPatch::default()
        };
        assert_eq!(FolderUpdate::from_patch(&messy).labels.as_deref(), Some("a,b"));

        assert_eq!(
            serde_json::to_value(FolderUpdate::parent(None)).unwrap(),
            json!({"parentId": null})
        );
    }

    #[tokio::test]
    async fn test_in_memory_remote_merges_fields() {
        let remote = InMemoryRemote::new();
        remote.update_document("d1", DocumentUpdate::favorite(true)).await.unwrap();
        remote
            .update_document("d1", DocumentUpdate::labels(&["x".to_string()]))
            .await
            .unwrap();
        remote.move_document("d1", Some("f1")).await.unwrap();

        assert_eq!(remote.field("d1", "favorite"), Some(json!(true)));
        assert_eq!(remote.field("d1", "labels"), Some(json!("x")));
        assert_eq!(remote.field("d1", "folderId"), Some(json!("f1")));
        assert_eq!(remote.applied().len(), 3);

        remote.delete_document("d1").await.unwrap();
        assert!(remote.is_deleted("d1"));
        assert_eq!(remote.field("d1", "favorite"), None);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.fail_next_call(RemoteError::Transport("offline".into()));
        remote.fail_for_id("f1", RemoteError::NotFound("f1".into()));

        assert_eq!(
            remote.delete_document("d1").await,
            Err(RemoteError::Transport("offline".into()))
        );
        assert!(remote.delete_document("d1").await.is_ok());
        assert!(remote.delete_folder("f1").await.is_err());

        remote.clear_failures();
        assert!(remote.delete_folder("f1").await.is_ok());
        assert_eq!(remote.calls().len(), 4);
        assert_eq!(remote.applied().len(), 2);
    }

    #[tokio::test]
    async fn test_pause_holds_calls() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.pause();

        let task = {
            let remote = Arc::clone(&remote);
            tokio::spawn(async move { remote.delete_folder("f1").await })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(remote.calls().len(), 1);
        assert!(remote.applied().is_empty());

        remote.resume();
        assert!(task.await.unwrap().is_ok());
        assert!(remote.is_deleted("f1"));
    }
}
