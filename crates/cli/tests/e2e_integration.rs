//! End-to-end tests for the Noteloom assistant core.
//!
//! These run against a real vault directory: prompt migration, prompt file
//! sync, system prompt composition and a full agent turn with tool calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use noteloom_agent::{
    ContextAssembler, ConversationOrchestrator, NoteTemplateEngine, OrchestratorSettings,
    TurnOptions,
};
use noteloom_config::{AppConfig, PromptsConfig};
use noteloom_core::CancellationToken;
use noteloom_core::enrich::NoopParser;
use noteloom_core::error::ProviderError;
use noteloom_core::message::{ConversationKind, MessageContext, NoteRef, Sender};
use noteloom_core::provider::{ModelClient, ModelRequest, ModelResponse, Usage};
use noteloom_core::store::FileChange;
use noteloom_core::tool::ToolCall;
use noteloom_prompts::{PromptCache, PromptComposer, PromptStore, PromptSync, migrate_legacy_prompt};
use noteloom_store::DiskFileStore;

// ── Mock Client ──────────────────────────────────────────────────────────

/// A model client that returns scripted responses in sequence.
struct ScriptedClient {
    responses: Mutex<Vec<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(
        &self,
        request: ModelRequest,
        _cancel: &CancellationToken,
    ) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedClient: no more responses");
        }
        Ok(responses.remove(0))
    }
}

fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        content: text.into(),
        tool_calls: vec![],
        usage: Some(Usage {
            prompt_tokens: 40,
            completion_tokens: 12,
            total_tokens: 52,
        }),
        model: "e2e-model".into(),
    }
}

fn tool_response(name: &str, arguments: serde_json::Value) -> ModelResponse {
    ModelResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }],
        usage: None,
        model: "e2e-model".into(),
    }
}

// ── Vault fixture ────────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    files: Arc<DiskFileStore>,
    prompts: Arc<PromptStore>,
}

async fn fixture(legacy_prompt: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("notes")).unwrap();
    std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
    std::fs::write(
        dir.path().join("notes/garden.md"),
        "Tomatoes need six hours of sun.\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes/reading.md"), "Finish Dune by May.").unwrap();

    let files = Arc::new(DiskFileStore::open(dir.path()).unwrap());
    let cache = Arc::new(PromptCache::new());
    let prompts = Arc::new(PromptStore::new(
        files.clone(),
        cache.clone(),
        PromptsConfig {
            folder: "prompts".into(),
            user_system_prompt: legacy_prompt.into(),
            ..Default::default()
        }
        .into_shared(),
    ));
    cache.load_all_system_prompts(&prompts).await.unwrap();

    Fixture {
        _dir: dir,
        files,
        prompts,
    }
}

fn composer(fx: &Fixture) -> Arc<PromptComposer> {
    Arc::new(PromptComposer::new(
        fx.prompts.clone(),
        Arc::new(NoteTemplateEngine::new(fx.files.clone())),
    ))
}

fn orchestrator(
    fx: &Fixture,
    kind: ConversationKind,
    client: Arc<ScriptedClient>,
) -> ConversationOrchestrator {
    ConversationOrchestrator::new(
        kind,
        ContextAssembler::new(fx.files.clone(), Arc::new(NoopParser)),
        composer(fx),
        client,
        Arc::new(noteloom_tools::default_registry(fx.files.clone())),
    )
    .with_settings(OrchestratorSettings::from_config(&AppConfig::default()))
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrated_prompt_drives_the_next_turn() {
    let fx = fixture("  Answer like a gardener.\r\n").await;

    let title = migrate_legacy_prompt(&fx.prompts).await.unwrap().unwrap();
    assert_eq!(title, "Migrated Custom System Prompt");
    assert!(fx.prompts.settings_snapshot().user_system_prompt.is_empty());

    let on_disk = std::fs::read_to_string(
        fx.files.root().join("prompts/Migrated Custom System Prompt.md"),
    )
    .unwrap();
    assert!(on_disk.starts_with("---"));
    assert!(on_disk.trim_end().ends_with("Answer like a gardener."));

    let client = Arc::new(ScriptedClient::new(vec![text_response("Plant in full sun.")]));
    let chat = orchestrator(&fx, ConversationKind::Chat, client.clone());
    assert!(
        chat.send_message(
            "Where should tomatoes go?",
            MessageContext::default(),
            &TurnOptions::default(),
            &CancellationToken::new()
        )
        .await
        .unwrap()
    );

    let system = &client.requests()[0].system_prompt;
    assert!(system.contains(
        "<user_custom_instructions>\nAnswer like a gardener.\n</user_custom_instructions>"
    ));
    // Using the prompt stamps it
    assert!(fx.prompts.cache().get(&title).await.unwrap().last_used_at.is_some());
}

#[tokio::test]
async fn renamed_default_prompt_stays_default() {
    let fx = fixture("Be concise.").await;
    let title = migrate_legacy_prompt(&fx.prompts).await.unwrap().unwrap();

    // Let the migration's own-write markers expire
    tokio::time::sleep(Duration::from_millis(600)).await;

    let old_path = fx.prompts.path_for(&title);
    let new_path = fx.prompts.path_for("Concise");
    std::fs::rename(
        fx.files.root().join(&old_path),
        fx.files.root().join(&new_path),
    )
    .unwrap();

    let sync = PromptSync::new(fx.prompts.clone(), Duration::from_millis(50));
    sync.handle_event(FileChange::rename(&old_path, &new_path)).await;

    assert_eq!(fx.prompts.default_title().as_deref(), Some("Concise"));
    assert!(fx.prompts.cache().get(&title).await.is_none());
    assert_eq!(
        fx.prompts.cache().get("Concise").await.unwrap().content,
        "Be concise."
    );
    sync.cleanup();
}

#[tokio::test]
async fn active_note_placeholder_reads_from_disk() {
    let fx = fixture("").await;
    let composed = composer(&fx)
        .compose(
            &ConversationKind::Chat,
            &noteloom_prompts::ComposeOptions {
                active_note: Some(NoteRef::new("notes/garden.md")),
                user_prompt_override: Some("Use {activeNote} and keep {} as is".into()),
                ..Default::default()
            },
        )
        .await;

    assert!(composed.text.contains("Use {activeNote} and keep {} as is"));
    assert!(composed.text.contains("Tomatoes need six hours of sun."));
    assert_eq!(composed.included_files, vec!["notes/garden.md"]);
}

#[tokio::test]
async fn agent_turn_reads_a_note_through_tools() {
    let fx = fixture("").await;
    let client = Arc::new(ScriptedClient::new(vec![
        tool_response("read_note", serde_json::json!({"path": "notes/reading.md"})),
        text_response("You planned to finish Dune by May."),
    ]));
    let agent = orchestrator(&fx, ConversationKind::Agent, client.clone());

    let context = MessageContext::default().with_note(NoteRef::new("notes/garden.md"));
    assert!(
        agent
            .send_message(
                "What am I reading?",
                context,
                &TurnOptions::default(),
                &CancellationToken::new()
            )
            .await
            .unwrap()
    );

    let messages = agent.display_messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::User);
    assert!(messages[0].processed_text.contains("<note_context>"));
    assert!(messages[0].processed_text.contains("Tomatoes need six hours of sun."));
    assert_eq!(messages[1].raw_text, "You planned to finish Dune by May.");

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 3);
    let tool_output = requests[1].messages.last().unwrap();
    assert_eq!(tool_output.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_output.content.contains("Finish Dune by May."));
    assert!(requests[0].system_prompt.contains("<tool_use_guidelines>"));
}
