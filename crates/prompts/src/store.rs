//! Durable side of the saved prompts: one markdown file per prompt.
//!
//! Every write goes through a pending-write guard and is mirrored into the
//! cache immediately, so the sync handlers can skip our own notifications.

use chrono::Utc;
use noteloom_config::{PromptsConfig, SharedPromptSettings};
use noteloom_core::error::{Error, Result};
use noteloom_core::store::{FileStore, normalize_path, parent_folder};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::PromptCache;
use crate::record::{self, PromptRecord};

pub const PROMPT_EXTENSION: &str = "md";

/// Title ↔ file mapping over the vault's prompts folder.
pub struct PromptStore {
    files: Arc<dyn FileStore>,
    cache: Arc<PromptCache>,
    settings: SharedPromptSettings,
}

impl PromptStore {
    pub fn new(files: Arc<dyn FileStore>, cache: Arc<PromptCache>, settings: SharedPromptSettings) -> Self {
        Self { files, cache, settings }
    }

    pub fn files(&self) -> &Arc<dyn FileStore> {
        &self.files
    }

    pub fn cache(&self) -> &Arc<PromptCache> {
        &self.cache
    }

    pub fn settings(&self) -> &SharedPromptSettings {
        &self.settings
    }

    /// A copy of the current prompt settings.
    pub fn settings_snapshot(&self) -> PromptsConfig {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut PromptsConfig)) {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        f(&mut settings);
    }

    pub fn folder(&self) -> String {
        normalize_path(&self.settings_snapshot().folder)
    }

    pub fn default_title(&self) -> Option<String> {
        self.settings_snapshot().default_prompt_title
    }

    pub fn set_default_title(&self, title: Option<String>) {
        self.update_settings(|s| s.default_prompt_title = title);
    }

    /// A prompt file sits directly in the prompts folder and has the prompt
    /// extension. Anything in a subfolder (e.g. `unsupported/`) is ignored.
    pub fn is_prompt_path(&self, path: &str) -> bool {
        let path = normalize_path(path);
        parent_folder(&path) == self.folder()
            && std::path::Path::new(&path)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(PROMPT_EXTENSION))
    }

    /// The prompt title for a prompt file path.
    pub fn title_for(&self, path: &str) -> Option<String> {
        if !self.is_prompt_path(path) {
            return None;
        }
        std::path::Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
    }

    pub fn path_for(&self, title: &str) -> String {
        let folder = self.folder();
        if folder.is_empty() {
            format!("{title}.{PROMPT_EXTENSION}")
        } else {
            format!("{folder}/{title}.{PROMPT_EXTENSION}")
        }
    }

    /// Read every prompt file in the folder. Unreadable files are skipped.
    pub async fn load_all(&self) -> Result<Vec<PromptRecord>> {
        let folder = self.folder();
        let mut records = Vec::new();
        for path in self.files.list(&folder).await? {
            if !self.is_prompt_path(&path) {
                continue;
            }
            match self.read_path(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path, error = %e, "Skipping unreadable prompt file"),
            }
        }
        debug!(folder = %folder, count = records.len(), "Prompt files scanned");
        Ok(records)
    }

    pub async fn read_path(&self, path: &str) -> Result<PromptRecord> {
        let title = self
            .title_for(path)
            .ok_or_else(|| Error::Validation(format!("not a prompt file: {path}")))?;
        let text = self.files.read(path).await?;
        Ok(PromptRecord::parse(title, &text, Utc::now()))
    }

    pub async fn read(&self, title: &str) -> Result<PromptRecord> {
        self.read_path(&self.path_for(title)).await
    }

    pub async fn exists(&self, title: &str) -> bool {
        self.files.exists(&self.path_for(title)).await
    }

    /// Create a new prompt file with fresh timestamps.
    pub async fn create(&self, title: &str, content: &str) -> Result<PromptRecord> {
        validate_title(title)?;
        let record = PromptRecord::new(title, content);
        let path = self.path_for(title);
        {
            let _guard = self.cache.pending_write(&path);
            self.files.create(&path, &record.to_file_text()).await?;
        }
        self.cache.upsert_cached_system_prompt(record.clone()).await;
        info!(title = %title, "Prompt created");
        Ok(record)
    }

    /// Create a file holding exactly `content`, with no frontmatter.
    pub async fn create_raw(&self, path: &str, content: &str) -> Result<()> {
        let _guard = self.cache.pending_write(path);
        self.files.create(path, content).await?;
        Ok(())
    }

    /// Overwrite a file under a pending-write guard.
    pub async fn write_raw(&self, path: &str, content: &str) -> Result<()> {
        let _guard = self.cache.pending_write(path);
        self.files.write(path, content).await?;
        Ok(())
    }

    pub async fn read_raw(&self, path: &str) -> Result<String> {
        Ok(self.files.read(path).await?)
    }

    /// Remove a file under a pending-write guard, leaving the cache alone.
    pub async fn delete_raw(&self, path: &str) -> Result<()> {
        let _guard = self.cache.pending_write(path);
        self.files.delete(path).await?;
        Ok(())
    }

    /// Persist an edited record, bumping its modified time.
    pub async fn save(&self, record: &PromptRecord) -> Result<PromptRecord> {
        let mut record = record.clone();
        record.modified_at = Utc::now();
        let path = self.path_for(&record.title);
        self.write_raw(&path, &record.to_file_text()).await?;
        self.cache.upsert_cached_system_prompt(record.clone()).await;
        Ok(record)
    }

    /// Stamp the prompt's last-used time in its frontmatter.
    pub async fn touch_last_used(&self, title: &str) -> Result<()> {
        let path = self.path_for(title);
        let text = self.files.read(&path).await?;
        let mut record = PromptRecord::parse(title, &text, Utc::now());
        let now = Utc::now();
        record.last_used_at = Some(now);
        self.write_raw(&path, &record::with_metadata(&text, &record))
            .await?;
        self.cache.mark_used(title, now).await;
        Ok(())
    }

    /// Rename a prompt, carrying the default-prompt setting along.
    pub async fn rename(&self, old_title: &str, new_title: &str) -> Result<()> {
        validate_title(new_title)?;
        let from = self.path_for(old_title);
        let to = self.path_for(new_title);
        {
            let _from_guard = self.cache.pending_write(&from);
            let _to_guard = self.cache.pending_write(&to);
            self.files.rename(&from, &to).await?;
        }

        self.cache.delete_cached_system_prompt(old_title).await;
        if self.default_title().as_deref() == Some(old_title) {
            self.set_default_title(Some(new_title.to_string()));
        }
        let record = self.read(new_title).await?;
        self.cache.upsert_cached_system_prompt(record).await;
        info!(from = %old_title, to = %new_title, "Prompt renamed");
        Ok(())
    }

    pub async fn delete(&self, title: &str) -> Result<()> {
        let path = self.path_for(title);
        {
            let _guard = self.cache.pending_write(&path);
            self.files.delete(&path).await?;
        }
        self.cache.delete_cached_system_prompt(title).await;
        if self.default_title().as_deref() == Some(title) {
            self.set_default_title(None);
        }
        info!(title = %title, "Prompt deleted");
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("prompt title is empty".into()));
    }
    if title.contains(['/', '\\']) {
        return Err(Error::Validation(format!(
            "prompt title must not contain path separators: {title}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteloom_store::InMemoryFileStore;

    fn store_with(files: Arc<InMemoryFileStore>) -> PromptStore {
        PromptStore::new(
            files,
            Arc::new(PromptCache::new()),
            PromptsConfig {
                folder: "prompts".into(),
                ..Default::default()
            }
            .into_shared(),
        )
    }

    #[test]
    fn classification_requires_direct_markdown_child() {
        let store = store_with(Arc::new(InMemoryFileStore::new()));
        assert!(store.is_prompt_path("prompts/Writer.md"));
        assert!(store.is_prompt_path("./prompts/Writer.MD"));
        assert!(!store.is_prompt_path("prompts/unsupported/Old.md"));
        assert!(!store.is_prompt_path("prompts/notes.txt"));
        assert!(!store.is_prompt_path("elsewhere/Writer.md"));
        assert!(!store.is_prompt_path("promptsx/Writer.md"));
        assert_eq!(store.title_for("prompts/Writer.md").as_deref(), Some("Writer"));
        assert_eq!(store.path_for("Writer"), "prompts/Writer.md");
    }

    #[tokio::test]
    async fn create_writes_frontmatter_and_caches() {
        let files = Arc::new(InMemoryFileStore::new());
        let store = store_with(files.clone());
        store.create("Writer", "Write well.").await.unwrap();

        let text = files.read("prompts/Writer.md").await.unwrap();
        assert!(record::has_metadata(&text));
        assert_eq!(record::strip_frontmatter(&text), "Write well.");
        assert_eq!(store.cache().get("Writer").await.unwrap().content, "Write well.");
    }

    #[tokio::test]
    async fn create_rejects_bad_titles() {
        let store = store_with(Arc::new(InMemoryFileStore::new()));
        assert!(matches!(store.create(" ", "x").await, Err(Error::Validation(_))));
        assert!(matches!(store.create("a/b", "x").await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn load_all_skips_non_prompt_files() {
        let files = Arc::new(InMemoryFileStore::new());
        files
            .seed([
                ("prompts/A.md", "alpha"),
                ("prompts/unsupported/B.md", "beta"),
                ("prompts/c.txt", "gamma"),
                ("notes/D.md", "delta"),
            ])
            .await;
        let store = store_with(files);
        let records = store.load_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "A");
        assert_eq!(records[0].content, "alpha");
    }

    #[tokio::test]
    async fn rename_carries_default_title() {
        let files = Arc::new(InMemoryFileStore::new());
        let store = store_with(files.clone());
        store.create("Old", "x").await.unwrap();
        store.set_default_title(Some("Old".into()));

        store.rename("Old", "New").await.unwrap();
        assert_eq!(store.default_title().as_deref(), Some("New"));
        assert!(store.cache().get("Old").await.is_none());
        assert!(store.cache().get("New").await.is_some());
        assert!(files.exists("prompts/New.md").await);
    }

    #[tokio::test]
    async fn delete_clears_default_title() {
        let store = store_with(Arc::new(InMemoryFileStore::new()));
        store.create("Gone", "x").await.unwrap();
        store.set_default_title(Some("Gone".into()));
        store.delete("Gone").await.unwrap();
        assert_eq!(store.default_title(), None);
        assert!(store.cache().is_empty().await);
    }

    #[tokio::test]
    async fn touch_last_used_updates_file_and_cache() {
        let files = Arc::new(InMemoryFileStore::new());
        let store = store_with(files.clone());
        store.create("Used", "body").await.unwrap();
        store.touch_last_used("Used").await.unwrap();

        let text = files.read("prompts/Used.md").await.unwrap();
        assert!(text.contains(record::LAST_USED_KEY));
        assert_eq!(record::strip_frontmatter(&text), "body");
        assert!(store.cache().get("Used").await.unwrap().last_used_at.is_some());
    }
}
