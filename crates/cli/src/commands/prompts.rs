//! `noteloom prompts`: Saved system prompt management.

use std::time::Duration;

use noteloom_config::AppConfig;
use noteloom_core::event::DomainEvent;
use noteloom_prompts::{PromptSync, migrate_legacy_prompt};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::Vault;

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let vault = Vault::open(config, false).await?;
    let cache = vault.prompts.cache();
    let default = vault.prompts.default_title();

    let titles = cache.titles().await;
    if titles.is_empty() {
        println!("No saved prompts in {}/", vault.prompts.folder());
        return Ok(());
    }

    for title in titles {
        let Some(record) = cache.get(&title).await else {
            continue;
        };
        let marker = if default.as_deref() == Some(title.as_str()) { "*" } else { " " };
        let used = record
            .last_used_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".into());
        println!("{marker} {title:<40} last used {used}");
    }
    Ok(())
}

pub async fn migrate() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let vault = Vault::open(config, false).await?;

    match migrate_legacy_prompt(&vault.prompts).await {
        Ok(Some(title)) => {
            vault.persist_prompt_settings()?;
            println!("Migrated the legacy prompt to '{title}' and made it the default.");
        }
        Ok(None) => println!("No legacy prompt to migrate."),
        Err(e) => {
            eprintln!("Migration failed, the legacy prompt was kept: {e}");
            return Err(e.into());
        }
    }
    Ok(())
}

pub async fn watch() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let debounce = Duration::from_millis(config.agent.sync_debounce_ms);
    let vault = Vault::open(config, true).await?;
    let default_before = vault.prompts.default_title();

    let sync = PromptSync::new(vault.prompts.clone(), debounce);
    sync.start();
    let mut events = vault.events.subscribe();

    println!(
        "Watching {}/ for prompt changes. Press Ctrl+C to stop.",
        vault.prompts.folder()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    if let DomainEvent::PromptCacheUpdated { operation, title, .. } = event.as_ref() {
                        println!("  {operation:<7} {title}");
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    sync.cleanup();
    if vault.prompts.default_title() != default_before {
        vault.persist_prompt_settings()?;
    }
    println!("Stopped.");
    Ok(())
}
