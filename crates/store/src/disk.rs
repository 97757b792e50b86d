//! Disk vault: a directory of text files watched with `notify`.
//!
//! This store never announces its own writes directly. Every change reaches
//! subscribers through the file-system watcher, the same way an edit made in
//! another editor would. Callers that must ignore their own writes use the
//! prompt cache's pending-write markers.

use async_trait::async_trait;
use noteloom_core::error::StoreError;
use noteloom_core::store::{FileChange, FileStore, normalize_path};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// A vault rooted at a directory on disk.
pub struct DiskFileStore {
    root: PathBuf,
    changes: broadcast::Sender<FileChange>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl DiskFileStore {
    /// Open a vault without watching it. Changes are never announced.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let shown = root.display().to_string();
        std::fs::create_dir_all(&root).map_err(|e| io_error(&shown, e))?;
        let root = root.canonicalize().map_err(|e| io_error(&shown, e))?;
        let (changes, _) = broadcast::channel(256);
        debug!(root = %root.display(), "Disk vault opened");
        Ok(Self {
            root,
            changes,
            watcher: Mutex::new(None),
        })
    }

    /// Open a vault and start watching it recursively.
    pub fn open_watched(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::open(root)?;
        store.start_watching()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn start_watching(&self) -> Result<(), StoreError> {
        let tx = self.changes.clone();
        let root = self.root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for change in translate_event(&root, &event) {
                        let _ = tx.send(change);
                    }
                }
                Err(e) => warn!(error = %e, "Vault watcher error"),
            }
        })
        .map_err(|e| StoreError::Unavailable(format!("failed to start watcher: {e}")))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| StoreError::Unavailable(format!("failed to watch vault: {e}")))?;

        let mut slot = self
            .watcher
            .lock()
            .map_err(|_| StoreError::Unavailable("watcher lock poisoned".into()))?;
        *slot = Some(watcher);
        Ok(())
    }

    /// Resolve a vault path under the root. `..` segments are refused.
    fn absolute(&self, path: &str) -> Result<PathBuf, StoreError> {
        let normalized = normalize_path(path);
        let mut full = self.root.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                warn!(path = %path, "Blocked path traversal");
                return Err(StoreError::InvalidPath(normalized));
            }
            full.push(segment);
        }
        Ok(full)
    }

    async fn ensure_parent(&self, full: &Path) -> Result<(), StoreError> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error_at(parent, e))?;
        }
        Ok(())
    }

    /// Error for an absolute path under the root, reported vault-relative.
    fn io_error_at(&self, full: &Path, e: std::io::Error) -> StoreError {
        io_error(&relative(&self.root, full).unwrap_or_default(), e)
    }
}

/// `path` is the vault-relative path; absolute paths stay out of errors.
fn io_error(path: &str, e: std::io::Error) -> StoreError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
        std::io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.to_string()),
        _ => StoreError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Vault-relative path for an absolute path reported by the watcher.
fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel = normalize_path(&rel.to_string_lossy());
    if rel.is_empty() { None } else { Some(rel) }
}

/// Map a watcher event onto vault change notifications.
///
/// Renames are only reported from the paired `RenameMode::Both` event; the
/// separate `From`/`To` halves that precede it are ignored so a rename is
/// never seen as a delete followed by a create.
fn translate_event(root: &Path, event: &Event) -> Vec<FileChange> {
    let paths = || event.paths.iter().filter_map(|p| relative(root, p));
    match &event.kind {
        EventKind::Create(_) => paths().map(FileChange::create).collect(),
        EventKind::Remove(_) => paths().map(FileChange::delete).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            match (event.paths.first(), event.paths.get(1)) {
                (Some(from), Some(to)) => match (relative(root, from), relative(root, to)) {
                    (Some(from), Some(to)) => vec![FileChange::rename(from, to)],
                    (None, Some(to)) => vec![FileChange::create(to)],
                    (Some(from), None) => vec![FileChange::delete(from)],
                    (None, None) => vec![],
                },
                _ => vec![],
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From | RenameMode::To)) => vec![],
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter_map(|p| {
                let rel = relative(root, p)?;
                Some(if p.exists() {
                    FileChange::create(rel)
                } else {
                    FileChange::delete(rel)
                })
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => vec![],
        EventKind::Modify(_) => paths().map(FileChange::modify).collect(),
        _ => vec![],
    }
}

#[async_trait]
impl FileStore for DiskFileStore {
    fn name(&self) -> &str {
        "disk"
    }

    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let full = self.absolute(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| io_error(&normalize_path(path), e))
    }

    async fn create(&self, path: &str, content: &str) -> Result<(), StoreError> {
        use tokio::io::AsyncWriteExt;

        let full = self.absolute(path)?;
        let rel = normalize_path(path);
        self.ensure_parent(&full).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
            .map_err(|e| io_error(&rel, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_error(&rel, e))?;
        file.flush().await.map_err(|e| io_error(&rel, e))
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let full = self.absolute(path)?;
        if !tokio::fs::try_exists(&full).await.unwrap_or(false) {
            return Err(StoreError::NotFound(normalize_path(path)));
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| io_error(&normalize_path(path), e))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let full = self.absolute(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| io_error(&normalize_path(path), e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let src = self.absolute(from)?;
        let dst = self.absolute(to)?;
        if tokio::fs::try_exists(&dst).await.unwrap_or(false) {
            return Err(StoreError::AlreadyExists(normalize_path(to)));
        }
        self.ensure_parent(&dst).await?;
        tokio::fs::rename(&src, &dst)
            .await
            .map_err(|e| io_error(&normalize_path(from), e))
    }

    async fn exists(&self, path: &str) -> bool {
        let Ok(full) = self.absolute(path) else {
            return false;
        };
        tokio::fs::try_exists(full).await.unwrap_or(false)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let start = self.absolute(prefix)?;
        if !tokio::fs::try_exists(&start).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| self.io_error_at(&dir, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| self.io_error_at(&dir, e))?
            {
                let name = entry.file_name();
                // Editor metadata and VCS folders
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| self.io_error_at(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Some(rel) = relative(&self.root, &path) {
                    found.push(rel);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }
}
