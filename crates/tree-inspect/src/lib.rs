//! tree-inspect: load a folder/document fixture and print diagnostics.
//!
//! A fixture is a JSON object with `folders`, `documents` and optional
//! `customLabels` arrays, in the same shape the remote serves them.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use tree_core::{Document, DocumentTree, Entry, Folder, SerializeError, TreeConfig};

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid fixture: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error("Folder not found: {0}")]
    UnknownFolder(String),
}

pub type Result<T> = std::result::Result<T, InspectError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub custom_labels: Vec<String>,
}

/// What to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum View {
    /// ASCII tree
    Tree,
    /// Item count and size per folder
    Stats,
    /// Global label catalog
    Catalog,
    /// Flat JSON form of the tree
    Json,
}

pub fn load_fixture(path: &Path) -> Result<Fixture> {
    let raw = std::fs::read_to_string(path).map_err(|source| InspectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fixture: Fixture = serde_json::from_str(&raw)?;
    debug!(
        folders = fixture.folders.len(),
        documents = fixture.documents.len(),
        "loaded fixture"
    );
    Ok(fixture)
}

/// Build the tree and render `view`. `folder` narrows the stats view.
pub fn inspect(fixture: Fixture, config: &TreeConfig, view: View, folder: Option<&str>) -> Result<String> {
    let custom_labels = fixture.custom_labels;
    let tree = DocumentTree::build_root_tree(fixture.documents, fixture.folders, config);

    match view {
        View::Tree => Ok(tree.print_tree()),
        View::Stats => folder_stats(&tree, folder),
        View::Catalog => {
            let catalog = tree.compute_label_catalog(&[], &custom_labels, &config.label_palette);
            let mut out = String::new();
            for row in catalog {
                let _ = writeln!(out, "{:<20} {:>5}  {}", row.name, row.count, row.color);
            }
            Ok(out)
        }
        View::Json => Ok(tree.tree().to_json_string()?),
    }
}

fn folder_stats(tree: &DocumentTree, folder: Option<&str>) -> Result<String> {
    let start = folder.unwrap_or(tree.root_id());
    if !tree.get(start).is_some_and(|n| n.is_folder()) {
        return Err(InspectError::UnknownFolder(start.to_string()));
    }

    let mut out = String::new();
    let folders = std::iter::once(start).chain(
        tree.tree()
            .descendants(start)
            .into_iter()
            .filter(|n| matches!(n.data(), Entry::Folder(_)))
            .map(|n| n.id()),
    );
    for id in folders {
        let path: Vec<&str> = tree.path(id).iter().map(|n| n.name()).collect();
        let stats = tree.compute_folder_stats(Some(id));
        let _ = writeln!(
            out,
            "{}  items={} size={}",
            path.join("/"),
            stats.total_items,
            stats.total_size
        );
    }
    Ok(out)
}
