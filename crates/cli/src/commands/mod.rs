//! Subcommand implementations and the vault wiring they share.

pub mod chat;
pub mod compose;
pub mod config_cmd;
pub mod prompts;

use std::sync::Arc;

use noteloom_agent::NoteTemplateEngine;
use noteloom_config::AppConfig;
use noteloom_core::event::EventBus;
use noteloom_core::message::ConversationKind;
use noteloom_prompts::{PromptCache, PromptComposer, PromptStore};
use noteloom_store::DiskFileStore;
use tracing::info;

use crate::ConversationArgs;

/// An opened vault with its prompt store loaded.
pub struct Vault {
    pub config: AppConfig,
    pub files: Arc<DiskFileStore>,
    pub prompts: Arc<PromptStore>,
    pub events: Arc<EventBus>,
}

impl Vault {
    /// Open the configured vault. `watched` starts a filesystem watcher.
    pub async fn open(config: AppConfig, watched: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let root = config.vault_root();
        let files = Arc::new(if watched {
            DiskFileStore::open_watched(&root)?
        } else {
            DiskFileStore::open(&root)?
        });

        let events = Arc::new(EventBus::default());
        let cache = Arc::new(PromptCache::new().with_events(events.clone()));
        let prompts = Arc::new(PromptStore::new(
            files.clone(),
            cache.clone(),
            config.prompts.clone().into_shared(),
        ));
        let loaded = cache.load_all_system_prompts(&prompts).await?;
        info!(vault = %files.root().display(), prompts = loaded, "Vault opened");

        Ok(Self {
            config,
            files,
            prompts,
            events,
        })
    }

    pub fn composer(&self) -> Arc<PromptComposer> {
        Arc::new(PromptComposer::new(
            self.prompts.clone(),
            Arc::new(NoteTemplateEngine::new(self.files.clone())),
        ))
    }

    /// Write the runtime prompt settings back to the config file.
    ///
    /// Reads the file fresh so values injected from the environment (such as
    /// the API key) are never persisted.
    pub fn persist_prompt_settings(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = AppConfig::config_path();
        let mut on_disk = AppConfig::load_from(&path)?;
        on_disk.prompts = self.prompts.settings_snapshot();
        on_disk.save_to(&path)?;
        info!(path = %path.display(), "Prompt settings saved");
        Ok(())
    }
}

/// Pick the conversation kind from the command line.
pub fn conversation_kind(
    config: &AppConfig,
    args: &ConversationArgs,
) -> Result<ConversationKind, Box<dyn std::error::Error>> {
    if let Some(name) = &args.project {
        let profile = config
            .project(name)
            .ok_or_else(|| format!("No project named '{name}' in the config"))?;
        return Ok(ConversationKind::Project(profile.clone()));
    }
    Ok(if args.agent {
        ConversationKind::Agent
    } else {
        ConversationKind::Chat
    })
}
