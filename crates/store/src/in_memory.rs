//! In-memory vault: useful for testing and ephemeral sessions.
//!
//! Behaves like an editor-managed vault: every mutation, whoever makes it,
//! is announced on the change stream.

use async_trait::async_trait;
use noteloom_core::error::StoreError;
use noteloom_core::store::{FileChange, FileStore, normalize_path};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// An in-memory vault that stores files in a sorted map.
pub struct InMemoryFileStore {
    files: Arc<RwLock<BTreeMap<String, String>>>,
    changes: broadcast::Sender<FileChange>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
            changes,
        }
    }

    /// Seed files without emitting notifications.
    pub async fn seed(&self, files: impl IntoIterator<Item = (&str, &str)>) {
        let mut map = self.files.write().await;
        for (path, content) in files {
            map.insert(normalize_path(path), content.to_string());
        }
    }

    fn emit(&self, change: FileChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}

impl Default for InMemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let path = normalize_path(path);
        self.files
            .read()
            .await
            .get(&path)
            .cloned()
            .ok_or(StoreError::NotFound(path))
    }

    async fn create(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let path = normalize_path(path);
        {
            let mut files = self.files.write().await;
            if files.contains_key(&path) {
                return Err(StoreError::AlreadyExists(path));
            }
            files.insert(path.clone(), content.to_string());
        }
        self.emit(FileChange::create(path));
        Ok(())
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let path = normalize_path(path);
        {
            let mut files = self.files.write().await;
            let Some(existing) = files.get_mut(&path) else {
                return Err(StoreError::NotFound(path));
            };
            *existing = content.to_string();
        }
        self.emit(FileChange::modify(path));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize_path(path);
        if self.files.write().await.remove(&path).is_none() {
            return Err(StoreError::NotFound(path));
        }
        self.emit(FileChange::delete(path));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        {
            let mut files = self.files.write().await;
            if files.contains_key(&to) {
                return Err(StoreError::AlreadyExists(to));
            }
            let Some(content) = files.remove(&from) else {
                return Err(StoreError::NotFound(from));
            };
            files.insert(to.clone(), content);
        }
        self.emit(FileChange::rename(from, to));
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.read().await.contains_key(&normalize_path(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let prefix = normalize_path(prefix);
        let files = self.files.read().await;
        Ok(files
            .keys()
            .filter(|p| prefix.is_empty() || p.starts_with(&format!("{prefix}/")))
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteloom_core::store::FileChangeKind;

    #[tokio::test]
    async fn create_read_write_roundtrip() {
        let store = InMemoryFileStore::new();
        store.create("notes/a.md", "first").await.unwrap();
        assert_eq!(store.read("notes/a.md").await.unwrap(), "first");

        store.write("notes/a.md", "second").await.unwrap();
        assert_eq!(store.read("./notes/a.md").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn create_rejects_existing_file() {
        let store = InMemoryFileStore::new();
        store.create("a.md", "x").await.unwrap();
        let err = store.create("a.md", "y").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn write_requires_existing_file() {
        let store = InMemoryFileStore::new();
        let err = store.write("missing.md", "y").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn mutations_are_announced_in_order() {
        let store = InMemoryFileStore::new();
        let mut rx = store.subscribe();

        store.create("p/a.md", "x").await.unwrap();
        store.write("p/a.md", "y").await.unwrap();
        store.rename("p/a.md", "p/b.md").await.unwrap();
        store.delete("p/b.md").await.unwrap();

        let kinds: Vec<FileChangeKind> = (0..4).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![
                FileChangeKind::Create,
                FileChangeKind::Modify,
                FileChangeKind::Rename,
                FileChangeKind::Delete
            ]
        );
    }

    #[tokio::test]
    async fn seed_is_silent() {
        let store = InMemoryFileStore::new();
        let mut rx = store.subscribe();
        store.seed([("a.md", "x")]).await;
        assert!(rx.try_recv().is_err());
        assert!(store.exists("a.md").await);
    }

    #[tokio::test]
    async fn list_filters_by_folder_prefix() {
        let store = InMemoryFileStore::new();
        store
            .seed([("p/a.md", ""), ("p/sub/b.md", ""), ("pp/c.md", ""), ("d.md", "")])
            .await;
        assert_eq!(store.list("p").await.unwrap(), vec!["p/a.md", "p/sub/b.md"]);
        assert_eq!(store.list("").await.unwrap().len(), 4);
    }
}
