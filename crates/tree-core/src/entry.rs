//! Domain payloads carried by the document tree.

use crate::labels;
use crate::node::{NodeKind, Payload};
use serde::{Deserialize, Serialize};

/// A document as known to the remote authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub doc_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "crate::labels::canonical")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub size: u64,
    /// Owning folder; `None` means top level.
    #[serde(default)]
    pub folder_id: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set labels from a canonical comma-separated string.
    pub fn with_labels(mut self, raw: &str) -> Self {
        self.labels = labels::parse(raw);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, with = "crate::labels::canonical")]
    pub labels: Vec<String>,
    /// Parent folder; `None` means top level.
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_labels(mut self, raw: &str) -> Self {
        self.labels = labels::parse(raw);
        self
    }
}

/// Payload of a node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Entry {
    /// Synthetic top-level container; never sent to the remote.
    Root { name: String },
    Folder(Folder),
    Document(Document),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Root { name } => name,
            Entry::Folder(f) => &f.name,
            Entry::Document(d) => &d.name,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            Entry::Root { .. } => &[],
            Entry::Folder(f) => &f.labels,
            Entry::Document(d) => &d.labels,
        }
    }

    pub(crate) fn labels_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Entry::Root { .. } => None,
            Entry::Folder(f) => Some(&mut f.labels),
            Entry::Document(d) => Some(&mut d.labels),
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Entry::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Entry::Folder(f) => Some(f),
            _ => None,
        }
    }

    /// Apply a patch of the matching kind. Returns false on a kind mismatch.
    pub fn apply(&mut self, patch: &EntryPatch) -> bool {
        match (self, patch) {
            (Entry::Document(doc), EntryPatch::Document(p)) => {
                p.apply(doc);
                true
            }
            (Entry::Folder(folder), EntryPatch::Folder(p)) => {
                p.apply(folder);
                true
            }
            _ => false,
        }
    }
}

impl Payload for Entry {
    fn kind(&self) -> NodeKind {
        match self {
            Entry::Document(_) => NodeKind::File,
            _ => NodeKind::Folder,
        }
    }

    fn size(&self) -> u64 {
        match self {
            Entry::Document(d) => d.size,
            _ => 0,
        }
    }

    fn set_parent(&mut self, parent_id: Option<&str>) {
        match self {
            Entry::Root { .. } => {}
            Entry::Folder(f) => f.parent_id = parent_id.map(str::to_string),
            Entry::Document(d) => d.folder_id = parent_id.map(str::to_string),
        }
    }

    fn set_id(&mut self, id: &str) {
        match self {
            Entry::Root { .. } => {}
            Entry::Folder(f) => f.id = id.to_string(),
            Entry::Document(d) => d.id = id.to_string(),
        }
    }
}

/// Partial update for a document. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl DocumentPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn favorite(value: bool) -> Self {
        Self {
            favorite: Some(value),
            ..Self::default()
        }
    }

    fn apply(&self, doc: &mut Document) {
        if let Some(name) = &self.name {
            doc.name = name.clone();
        }
        if let Some(doc_type) = &self.doc_type {
            doc.doc_type = doc_type.clone();
        }
        if let Some(description) = &self.description {
            doc.description = Some(description.clone());
        }
        if let Some(list) = &self.labels {
            doc.labels = labels::normalize(list.iter().cloned());
        }
        if let Some(favorite) = self.favorite {
            doc.favorite = favorite;
        }
        if let Some(size) = self.size {
            doc.size = size;
        }
    }
}

/// Partial update for a folder. Moves go through relocation, not patches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl FolderPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    fn apply(&self, folder: &mut Folder) {
        if let Some(name) = &self.name {
            folder.name = name.clone();
        }
        if let Some(description) = &self.description {
            folder.description = Some(description.clone());
        }
        if let Some(color) = &self.color {
            folder.color = Some(color.clone());
        }
        if let Some(list) = &self.labels {
            folder.labels = labels::normalize(list.iter().cloned());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPatch {
    Document(DocumentPatch),
    Folder(FolderPatch),
}

impl EntryPatch {
    pub fn touches_labels(&self) -> bool {
        match self {
            EntryPatch::Document(p) => p.labels.is_some(),
            EntryPatch::Folder(p) => p.labels.is_some(),
        }
    }

    pub fn renames(&self) -> Option<&str> {
        match self {
            EntryPatch::Document(p) => p.name.as_deref(),
            EntryPatch::Folder(p) => p.name.as_deref(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            EntryPatch::Document(_) => NodeKind::File,
            EntryPatch::Folder(_) => NodeKind::Folder,
        }
    }
}

impl From<DocumentPatch> for EntryPatch {
    fn from(patch: DocumentPatch) -> Self {
        EntryPatch::Document(patch)
    }
}

impl From<FolderPatch> for EntryPatch {
    fn from(patch: FolderPatch) -> Self {
        EntryPatch::Folder(patch)
    }
}
