//! In-memory mirror of the saved prompts.
//!
//! The cache is the only state shared between the conversation path (the
//! composer reads it) and the file sync path (the handlers mutate it). It also
//! owns the pending-write markers that let the sync handlers recognize change
//! notifications caused by our own writes.

use chrono::{DateTime, Utc};
use noteloom_core::event::{DomainEvent, EventBus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::record::PromptRecord;
use crate::store::PromptStore;

/// How long a released marker still suppresses notifications. Watchers report
/// changes after the write call has already returned.
pub const PENDING_WRITE_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct PendingWrite {
    active: usize,
    released_at: Option<Instant>,
}

impl PendingWrite {
    fn is_live(&self) -> bool {
        self.active > 0
            || self
                .released_at
                .is_some_and(|at| at.elapsed() < PENDING_WRITE_GRACE)
    }
}

/// Saved prompts keyed by title.
pub struct PromptCache {
    entries: RwLock<HashMap<String, PromptRecord>>,
    pending: Mutex<HashMap<String, PendingWrite>>,
    events: Option<Arc<EventBus>>,
}

impl PromptCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Publish `PromptCacheUpdated` events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Replace the cache contents with a full scan of the prompts folder.
    pub async fn load_all_system_prompts(&self, store: &PromptStore) -> noteloom_core::Result<usize> {
        let records = store.load_all().await?;
        let count = records.len();
        let mut entries = self.entries.write().await;
        entries.clear();
        for record in records {
            entries.insert(record.title.clone(), record);
        }
        drop(entries);
        debug!(count, "Prompt cache loaded");
        self.publish("load", "");
        Ok(count)
    }

    pub async fn upsert_cached_system_prompt(&self, record: PromptRecord) {
        let title = record.title.clone();
        self.entries.write().await.insert(title.clone(), record);
        debug!(title = %title, "Prompt cached");
        self.publish("upsert", &title);
    }

    /// Returns `false` when the title was not cached.
    pub async fn delete_cached_system_prompt(&self, title: &str) -> bool {
        let removed = self.entries.write().await.remove(title).is_some();
        if removed {
            debug!(title = %title, "Prompt evicted");
            self.publish("delete", title);
        }
        removed
    }

    pub async fn get(&self, title: &str) -> Option<PromptRecord> {
        self.entries.read().await.get(title).cloned()
    }

    /// Record a use without touching the file.
    pub async fn mark_used(&self, title: &str, at: DateTime<Utc>) {
        if let Some(record) = self.entries.write().await.get_mut(title) {
            record.last_used_at = Some(at);
        }
    }

    /// Titles, most recently used first. Never-used prompts follow, by title.
    pub async fn titles(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut records: Vec<&PromptRecord> = entries.values().collect();
        records.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        records.into_iter().map(|r| r.title.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // --- Own-write suppression ---

    pub fn mark_pending_write(&self, path: &str) {
        let mut pending = self.lock_pending();
        let marker = pending.entry(path.to_string()).or_default();
        marker.active += 1;
        marker.released_at = None;
    }

    pub fn clear_pending_write(&self, path: &str) {
        let mut pending = self.lock_pending();
        if let Some(marker) = pending.get_mut(path) {
            marker.active = marker.active.saturating_sub(1);
            if marker.active == 0 {
                marker.released_at = Some(Instant::now());
            }
        }
        pending.retain(|_, m| m.is_live());
    }

    pub fn is_pending_write(&self, path: &str) -> bool {
        self.lock_pending().get(path).is_some_and(PendingWrite::is_live)
    }

    /// Mark `path` as being written until the returned guard is dropped.
    pub fn pending_write(&self, path: &str) -> PendingWriteGuard<'_> {
        self.mark_pending_write(path);
        PendingWriteGuard {
            cache: self,
            path: path.to_string(),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingWrite>> {
        // The map holds plain counters; a panic elsewhere cannot corrupt it
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, operation: &str, title: &str) {
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::PromptCacheUpdated {
                operation: operation.into(),
                title: title.into(),
                timestamp: Utc::now(),
            });
        }
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears a pending-write marker on drop.
pub struct PendingWriteGuard<'a> {
    cache: &'a PromptCache,
    path: String,
}

impl Drop for PendingWriteGuard<'_> {
    fn drop(&mut self) {
        self.cache.clear_pending_write(&self.path);
    }
}
