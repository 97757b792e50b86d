//! One-time move of the legacy free-text prompt setting into a saved prompt.
//!
//! The legacy setting is only cleared after the new file has been read back
//! and matches what was written. Any failure before that point leaves the
//! setting untouched, and a file that fails the read-back is removed again.

use chrono::Utc;
use noteloom_core::error::{Error, Result};
use tracing::{info, warn};

use crate::record::{self, PromptRecord};
use crate::store::PromptStore;

pub const MIGRATED_PROMPT_TITLE: &str = "Migrated Custom System Prompt";

/// Migrate the legacy prompt, if any.
///
/// Returns the title of the new prompt, or `None` when there was nothing to
/// migrate. On success the new prompt becomes the default.
pub async fn migrate_legacy_prompt(store: &PromptStore) -> Result<Option<String>> {
    let legacy = store.settings_snapshot().user_system_prompt;
    let expected = legacy.trim();
    if expected.is_empty() {
        return Ok(None);
    }

    let title = available_title(store).await;
    let path = store.path_for(&title);

    let draft = PromptRecord::new(title.as_str(), expected);
    store.create_raw(&path, &draft.to_file_text()).await?;

    let read_back = store.read_raw(&path).await?;
    let actual = normalize(record::strip_frontmatter(&read_back));
    if actual != normalize(expected) {
        warn!(
            title = %title,
            expected_len = expected.len(),
            actual_len = actual.len(),
            "Migrated prompt does not match the legacy setting, keeping the setting"
        );
        if let Err(e) = store.delete_raw(&path).await {
            warn!(path = %path, error = %e, "Could not remove the unverified prompt file");
        }
        return Err(Error::Verification(format!(
            "content of '{path}' differs from the legacy prompt"
        )));
    }

    store.update_settings(|s| {
        s.user_system_prompt.clear();
        s.default_prompt_title = Some(title.clone());
    });
    let record = PromptRecord::parse(title.as_str(), &read_back, Utc::now());
    store.cache().upsert_cached_system_prompt(record).await;

    info!(title = %title, "Legacy prompt migrated");
    Ok(Some(title))
}

/// First of `base`, `base 2`, `base 3`, ... with no existing file.
async fn available_title(store: &PromptStore) -> String {
    if !store.exists(MIGRATED_PROMPT_TITLE).await {
        return MIGRATED_PROMPT_TITLE.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{MIGRATED_PROMPT_TITLE} {n}");
        if !store.exists(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}
