//! `noteloom chat`: Interactive or single-message conversation.

use std::io::Write;
use std::sync::Arc;

use noteloom_agent::{ContextAssembler, ConversationOrchestrator, OrchestratorSettings, TurnOptions};
use noteloom_config::AppConfig;
use noteloom_core::CancellationToken;
use noteloom_core::enrich::NoopParser;
use noteloom_core::message::{ConversationKind, MessageContext, NoteRef};
use noteloom_providers::OpenAiCompatClient;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{Vault, conversation_kind};
use crate::ConversationArgs;

pub async fn run(
    message: Option<String>,
    notes: Vec<String>,
    urls: Vec<String>,
    args: ConversationArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions when no API key is set
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    NOTELOOM_API_KEY=...   (generic)");
        eprintln!("    OPENAI_API_KEY=sk-...  (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let kind = conversation_kind(&config, &args)?;
    let vault = Vault::open(config, false).await?;
    let client = Arc::new(OpenAiCompatClient::from_config(&vault.config)?);
    let tools = Arc::new(noteloom_tools::default_registry(vault.files.clone()));

    let orchestrator = ConversationOrchestrator::new(
        kind.clone(),
        ContextAssembler::new(vault.files.clone(), Arc::new(NoopParser)),
        vault.composer(),
        client,
        tools,
    )
    .with_settings(OrchestratorSettings::from_config(&vault.config))
    .with_events(vault.events.clone());

    let options = TurnOptions {
        active_note: args.active.as_deref().map(NoteRef::new),
        user_prompt_override: args.prompt.clone(),
        ..Default::default()
    };

    let mut first_context = MessageContext::default();
    for note in notes {
        first_context.add_note(NoteRef::new(note));
    }
    for url in urls {
        first_context.add_url(url);
    }

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let sent = send(&orchestrator, &msg, first_context, &options).await?;
        eprint!("\r              \r");
        print_last(&orchestrator, sent).await;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Noteloom — Interactive Mode");
    println!();
    println!("  Vault:     {}", vault.files.root().display());
    println!("  Model:     {}", vault.config.default_model);
    println!("  Mode:      {}", mode_label(&kind));
    println!();
    println!("  Commands:  /regen  /clear  /exit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut context = Some(first_context);

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" | "exit" => break,
            "/clear" => {
                orchestrator.clear().await;
                println!("  (conversation cleared)");
                continue;
            }
            "/regen" => {
                let last = orchestrator.display_messages().await.last().map(|m| m.id.clone());
                let Some(id) = last else {
                    println!("  (nothing to regenerate)");
                    continue;
                };
                let cancel = cancel_on_ctrl_c();
                let regenerated = orchestrator.regenerate_message(&id, &options, &cancel).await;
                cancel.cancel();
                match regenerated {
                    Ok(true) => print_last(&orchestrator, true).await,
                    Ok(false) => println!("  (nothing to regenerate)"),
                    Err(e) => eprintln!("  [Error] {e}"),
                }
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let sent = send(&orchestrator, line, context.take().unwrap_or_default(), &options).await;
        eprint!("\r     \r");
        match sent {
            Ok(sent) => print_last(&orchestrator, sent).await,
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn send(
    orchestrator: &ConversationOrchestrator,
    text: &str,
    context: MessageContext,
    options: &TurnOptions,
) -> Result<bool, Box<dyn std::error::Error>> {
    let cancel = cancel_on_ctrl_c();
    let sent = orchestrator
        .send_message(text, context, options, &cancel)
        .await;
    // Also stops the Ctrl+C listener
    cancel.cancel();
    Ok(sent?)
}

/// A token that fires on Ctrl+C, or never if the turn finishes first.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => child.cancel(),
            _ = child.cancelled() => {}
        }
    });
    token
}

async fn print_last(orchestrator: &ConversationOrchestrator, sent: bool) {
    let messages = orchestrator.display_messages().await;
    let Some(last) = messages.last() else {
        return;
    };
    println!();
    if !last.is_visible {
        println!("  [Notice] {}", last.raw_text);
    } else if sent {
        for line in last.raw_text.lines() {
            println!("  Assistant > {line}");
        }
    } else {
        println!("  (no reply)");
    }
    println!();
}

fn mode_label(kind: &ConversationKind) -> String {
    match kind {
        ConversationKind::Chat => "chat".into(),
        ConversationKind::Agent => "agent (vault tools)".into(),
        ConversationKind::Project(p) => format!("project '{}'", p.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteloom_core::message::ProjectProfile;

    #[test]
    fn mode_labels() {
        assert_eq!(mode_label(&ConversationKind::Chat), "chat");
        let project = ConversationKind::Project(ProjectProfile {
            name: "thesis".into(),
            ..Default::default()
        });
        assert_eq!(mode_label(&project), "project 'thesis'");
    }
}
