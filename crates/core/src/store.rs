//! File store trait: the vault the assistant reads notes and prompts from.
//!
//! Paths are vault-relative and always use `/` as separator. Every change
//! (including the store's own writes) is announced on a broadcast stream so
//! caches can stay in sync with edits made outside the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StoreError;

/// The kind of a file-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Create,
    Modify,
    Delete,
    Rename,
}

/// A file-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: FileChangeKind,

    /// The affected path (the new path for renames)
    pub path: String,

    /// The previous path, only set for renames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

impl FileChange {
    pub fn create(path: impl Into<String>) -> Self {
        Self { kind: FileChangeKind::Create, path: path.into(), old_path: None }
    }

    pub fn modify(path: impl Into<String>) -> Self {
        Self { kind: FileChangeKind::Modify, path: path.into(), old_path: None }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self { kind: FileChangeKind::Delete, path: path.into(), old_path: None }
    }

    pub fn rename(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind: FileChangeKind::Rename,
            path: path.into(),
            old_path: Some(old_path.into()),
        }
    }
}

/// The file store collaborator.
///
/// Implementations: in-memory vault (tests, ephemeral sessions), disk vault.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// The backend name (e.g., "memory", "disk").
    fn name(&self) -> &str;

    /// Read a text file.
    async fn read(&self, path: &str) -> std::result::Result<String, StoreError>;

    /// Create a new file. Fails if it already exists.
    async fn create(&self, path: &str, content: &str) -> std::result::Result<(), StoreError>;

    /// Overwrite an existing file.
    async fn write(&self, path: &str, content: &str) -> std::result::Result<(), StoreError>;

    /// Delete a file.
    async fn delete(&self, path: &str) -> std::result::Result<(), StoreError>;

    /// Move a file.
    async fn rename(&self, from: &str, to: &str) -> std::result::Result<(), StoreError>;

    /// Whether a file exists.
    async fn exists(&self, path: &str) -> bool;

    /// All file paths under `prefix` (recursive). An empty prefix lists the vault.
    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<FileChange>;
}

/// Normalize a vault path: forward slashes, no leading `./` or `/`, no
/// trailing slash.
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let trimmed = replaced.trim_start_matches("./").trim_matches('/');
    trimmed
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent folder of a vault path (`""` for the vault root).
pub fn parent_folder(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}
