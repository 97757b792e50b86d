//! `noteloom compose`: Print the system prompt a turn would be sent with.

use noteloom_config::AppConfig;
use noteloom_core::message::NoteRef;
use noteloom_prompts::ComposeOptions;

use super::{Vault, conversation_kind};
use crate::ConversationArgs;

pub async fn run(args: ConversationArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let kind = conversation_kind(&config, &args)?;
    let vault = Vault::open(config, false).await?;

    let options = ComposeOptions {
        active_note: args.active.as_deref().map(NoteRef::new),
        tools_offered: kind.uses_tools(),
        user_prompt_override: args.prompt.clone(),
        ..Default::default()
    };
    let composed = vault.composer().compose(&kind, &options).await;

    println!("{}", composed.text);
    if !composed.included_files.is_empty() {
        eprintln!();
        eprintln!("  Included files:");
        for path in &composed.included_files {
            eprintln!("    {path}");
        }
    }
    Ok(())
}
