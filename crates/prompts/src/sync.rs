//! Keeps the prompt cache in step with edits made outside the assistant.
//!
//! A spawned listener consumes the vault's change stream. Every handler first
//! checks that the path is a prompt file and that it is not carrying one of
//! our own pending-write markers. Modifications are debounced per path
//! (trailing edge) so a content write followed by a frontmatter write is seen
//! once.

use chrono::Utc;
use noteloom_core::store::{FileChange, FileChangeKind, normalize_path};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::record::{self, PromptRecord};
use crate::store::PromptStore;

/// Sync handlers plus the listener task that drives them.
pub struct PromptSync {
    handlers: Arc<SyncHandlers>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PromptSync {
    pub fn new(store: Arc<PromptStore>, debounce: Duration) -> Self {
        Self {
            handlers: Arc::new(SyncHandlers {
                store,
                debounce,
                timers: Mutex::new(HashMap::new()),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Subscribe to the vault and start handling changes in the background.
    pub fn start(&self) {
        let mut rx = self.handlers.store.files().subscribe();
        let handlers = Arc::clone(&self.handlers);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => handlers.dispatch(change).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Prompt sync fell behind, rescanning");
                        let cache = Arc::clone(handlers.store.cache());
                        if let Err(e) = cache.load_all_system_prompts(&handlers.store).await {
                            warn!(error = %e, "Prompt rescan failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Prompt sync listener stopped");
        });

        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        info!("Prompt sync started");
    }

    /// Handle one change notification directly, without the listener.
    pub async fn handle_event(&self, change: FileChange) {
        self.handlers.dispatch(change).await;
    }

    /// Number of debounced modifications still waiting to fire.
    pub fn pending_timers(&self) -> usize {
        let mut timers = self.handlers.lock_timers();
        timers.retain(|_, handle| !handle.is_finished());
        timers.len()
    }

    /// Stop the listener and cancel every outstanding timer. Nothing fires
    /// after this returns.
    pub fn cleanup(&self) {
        if let Some(task) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        let mut timers = self.handlers.lock_timers();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        debug!("Prompt sync cleaned up");
    }
}

impl Drop for PromptSync {
    fn drop(&mut self) {
        self.cleanup();
    }
}

struct SyncHandlers {
    store: Arc<PromptStore>,
    debounce: Duration,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SyncHandlers {
    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_own_write(&self, path: &str) -> bool {
        self.store.cache().is_pending_write(path)
    }

    async fn dispatch(self: &Arc<Self>, change: FileChange) {
        let path = normalize_path(&change.path);
        match change.kind {
            FileChangeKind::Create => self.on_create(&path).await,
            FileChangeKind::Modify => self.schedule_modify(path),
            FileChangeKind::Delete => self.on_delete(&path).await,
            FileChangeKind::Rename => {
                let old = change.old_path.as_deref().map(normalize_path).unwrap_or_default();
                self.on_rename(&old, &path).await;
            }
        }
    }

    /// New prompt files get timestamps if they have none, then are cached.
    async fn on_create(&self, path: &str) {
        if !self.store.is_prompt_path(path) || self.is_own_write(path) {
            return;
        }
        let text = match self.store.read_raw(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path, error = %e, "Created prompt unreadable");
                return;
            }
        };
        let Some(title) = self.store.title_for(path) else {
            return;
        };
        let record = PromptRecord::parse(title, &text, Utc::now());
        if !record::has_metadata(&text) {
            if let Err(e) = self
                .store
                .write_raw(path, &record::with_metadata(&text, &record))
                .await
            {
                warn!(path = %path, error = %e, "Could not add prompt timestamps");
            }
        }
        self.store.cache().upsert_cached_system_prompt(record).await;
    }

    /// Arm (or re-arm) the trailing-edge timer for `path`.
    fn schedule_modify(self: &Arc<Self>, path: String) {
        if !self.store.is_prompt_path(&path) || self.is_own_write(&path) {
            return;
        }
        let handlers = Arc::clone(self);
        let key = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(handlers.debounce).await;
            handlers.on_modify_settled(&path).await;
        });
        let mut timers = self.lock_timers();
        timers.retain(|_, h| !h.is_finished());
        if let Some(previous) = timers.insert(key, handle) {
            previous.abort();
        }
    }

    async fn on_modify_settled(&self, path: &str) {
        if self.is_own_write(path) {
            return;
        }
        match self.store.read_path(path).await {
            Ok(record) => {
                debug!(path = %path, "Prompt modified");
                self.store.cache().upsert_cached_system_prompt(record).await;
            }
            Err(e) => debug!(path = %path, error = %e, "Modified prompt gone before settling"),
        }
    }

    async fn on_delete(&self, path: &str) {
        self.cancel_timer(path);
        if self.is_own_write(path) {
            return;
        }
        let Some(title) = self.store.title_for(path) else {
            return;
        };
        self.store.cache().delete_cached_system_prompt(&title).await;
        if self.store.default_title().as_deref() == Some(title.as_str()) {
            self.store.set_default_title(None);
            info!(title = %title, "Default prompt deleted, setting cleared");
        }
    }

    async fn on_rename(&self, old_path: &str, new_path: &str) {
        self.cancel_timer(old_path);
        if self.is_own_write(old_path) || self.is_own_write(new_path) {
            return;
        }

        let new_title = self.store.title_for(new_path);
        if let Some(old_title) = self.store.title_for(old_path) {
            self.store.cache().delete_cached_system_prompt(&old_title).await;
            if self.store.default_title().as_deref() == Some(old_title.as_str()) {
                match &new_title {
                    Some(title) => info!(from = %old_title, to = %title, "Default prompt renamed"),
                    None => info!(title = %old_title, "Default prompt moved out of the prompts folder"),
                }
                self.store.set_default_title(new_title.clone());
            }
        }

        if new_title.is_some() {
            match self.store.read_path(new_path).await {
                Ok(record) => self.store.cache().upsert_cached_system_prompt(record).await,
                Err(e) => warn!(path = %new_path, error = %e, "Renamed prompt unreadable"),
            }
        }
    }

    fn cancel_timer(&self, path: &str) {
        if let Some(handle) = self.lock_timers().remove(path) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{PENDING_WRITE_GRACE, PromptCache};
    use noteloom_config::PromptsConfig;
    use noteloom_core::store::FileStore;
    use noteloom_store::InMemoryFileStore;

    const DEBOUNCE: Duration = Duration::from_millis(1000);

    async fn setup() -> (Arc<InMemoryFileStore>, Arc<PromptStore>, PromptSync) {
        let files = Arc::new(InMemoryFileStore::new());
        let settings = PromptsConfig {
            folder: "prompts".into(),
            ..Default::default()
        }
        .into_shared();
        let store = Arc::new(PromptStore::new(
            files.clone(),
            Arc::new(PromptCache::new()),
            settings,
        ));
        let sync = PromptSync::new(store.clone(), DEBOUNCE);
        (files, store, sync)
    }

    #[tokio::test(start_paused = true)]
    async fn external_create_backfills_metadata_and_caches() {
        let (files, store, sync) = setup().await;
        files.seed([("prompts/Ext.md", "external body")]).await;

        sync.handle_event(FileChange::create("prompts/Ext.md")).await;

        assert_eq!(store.cache().get("Ext").await.unwrap().content, "external body");
        let text = files.read("prompts/Ext.md").await.unwrap();
        assert!(record::has_metadata(&text));
        assert_eq!(record::strip_frontmatter(&text), "external body");
    }

    #[tokio::test(start_paused = true)]
    async fn non_prompt_paths_are_ignored() {
        let (files, store, sync) = setup().await;
        files
            .seed([("prompts/unsupported/X.md", "x"), ("notes/Y.md", "y")])
            .await;
        sync.handle_event(FileChange::create("prompts/unsupported/X.md")).await;
        sync.handle_event(FileChange::create("notes/Y.md")).await;
        assert!(store.cache().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn own_writes_are_skipped() {
        let (files, store, sync) = setup().await;
        files.seed([("prompts/Mine.md", "mine")]).await;
        store.cache().mark_pending_write("prompts/Mine.md");

        sync.handle_event(FileChange::create("prompts/Mine.md")).await;
        assert!(store.cache().get("Mine").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn modify_is_debounced_to_the_last_event() {
        let (files, store, sync) = setup().await;
        files.seed([("prompts/D.md", "v1")]).await;

        sync.handle_event(FileChange::modify("prompts/D.md")).await;
        tokio::time::advance(Duration::from_millis(400)).await;
        files.seed([("prompts/D.md", "v2")]).await;
        sync.handle_event(FileChange::modify("prompts/D.md")).await;
        tokio::time::advance(Duration::from_millis(400)).await;
        tokio::task::yield_now().await;

        // First timer was replaced, second has not fired yet
        assert!(store.cache().get("D").await.is_none());
        assert_eq!(sync.pending_timers(), 1);

        tokio::time::advance(Duration::from_millis(700)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(store.cache().get("D").await.unwrap().content, "v2");
        assert_eq!(sync.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_cancels_pending_timers() {
        let (files, store, sync) = setup().await;
        files.seed([("prompts/C.md", "c")]).await;
        sync.handle_event(FileChange::modify("prompts/C.md")).await;
        assert_eq!(sync.pending_timers(), 1);

        sync.cleanup();
        tokio::time::advance(DEBOUNCE * 3).await;
        tokio::task::yield_now().await;
        assert!(store.cache().get("C").await.is_none());
        assert_eq!(sync.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_clears_matching_default() {
        let (_files, store, sync) = setup().await;
        store.cache().upsert_cached_system_prompt(PromptRecord::new("Def", "x")).await;
        store.set_default_title(Some("Def".into()));

        sync.handle_event(FileChange::delete("prompts/Def.md")).await;
        assert!(store.cache().get("Def").await.is_none());
        assert_eq!(store.default_title(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rename_within_folder_rewrites_default() {
        let (files, store, sync) = setup().await;
        files.seed([("prompts/New.md", "body")]).await;
        store.cache().upsert_cached_system_prompt(PromptRecord::new("Old", "body")).await;
        store.set_default_title(Some("Old".into()));

        sync.handle_event(FileChange::rename("prompts/Old.md", "prompts/New.md")).await;
        assert_eq!(store.default_title().as_deref(), Some("New"));
        assert!(store.cache().get("Old").await.is_none());
        assert_eq!(store.cache().get("New").await.unwrap().content, "body");
    }

    #[tokio::test(start_paused = true)]
    async fn rename_out_of_folder_clears_default() {
        let (files, store, sync) = setup().await;
        files.seed([("archive/Old.md", "body")]).await;
        store.cache().upsert_cached_system_prompt(PromptRecord::new("Old", "body")).await;
        store.set_default_title(Some("Old".into()));

        sync.handle_event(FileChange::rename("prompts/Old.md", "archive/Old.md")).await;
        assert_eq!(store.default_title(), None);
        assert!(store.cache().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn rename_into_folder_adds_prompt() {
        let (files, store, sync) = setup().await;
        files.seed([("prompts/Moved.md", "moved in")]).await;
        sync.handle_event(FileChange::rename("inbox/Moved.md", "prompts/Moved.md")).await;
        assert_eq!(store.cache().get("Moved").await.unwrap().content, "moved in");
        assert_eq!(store.default_title(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_applies_external_changes_but_not_own_writes() {
        let (files, store, sync) = setup().await;
        sync.start();
        tokio::task::yield_now().await;

        // Own write without frontmatter: a handler would back-fill it
        store.create_raw("prompts/Own.md", "own body").await.unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        // External edit arrives after the grace window
        tokio::time::advance(PENDING_WRITE_GRACE * 2).await;
        files.create("prompts/Ext.md", "ext body").await.unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(files.read("prompts/Own.md").await.unwrap(), "own body");
        assert!(store.cache().get("Own").await.is_none());
        assert_eq!(store.cache().get("Ext").await.unwrap().content, "ext body");
        sync.cleanup();
    }
}
