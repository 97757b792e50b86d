//! One conversation, end to end.
//!
//! The orchestrator owns the conversation's [`MessageRepository`] and wires
//! context assembly, prompt composition and the tool loop together for each
//! turn. Mutating operations are serialized by an operation lock; reads only
//! take the repository lock, so projections stay available while a turn is
//! being enriched or generated.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use noteloom_config::AppConfig;
use noteloom_core::CancellationToken;
use noteloom_core::error::{Error, ProviderError, Result};
use noteloom_core::event::{DomainEvent, EventBus};
use noteloom_core::message::{ConversationKind, Message, MessageContext, NoteRef, Sender};
use noteloom_core::provider::{ChatMessage, ModelClient, ModelRequest};
use noteloom_core::tool::ToolRegistry;
use noteloom_prompts::{ComposeOptions, PromptComposer};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{ContextAssembler, ContextRequest};
use crate::rate_limit::RateLimitNotice;
use crate::repository::MessageRepository;
use crate::tool_loop::{LoopOutcome, ToolLoopExecutor};

/// Model and loop settings for a conversation.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_tool_iterations: u32,
    pub include_active_note: bool,
    pub rate_limit_notice: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            max_tool_iterations: config.agent.max_tool_iterations,
            include_active_note: config.agent.include_active_note,
            rate_limit_notice: Duration::from_secs(config.agent.rate_limit_notice_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Per-turn inputs from the editor.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub active_note: Option<NoteRef>,
    /// Memory layer for the system prompt
    pub memory: Option<String>,
    /// Custom instructions replacing the saved default prompt for this turn
    pub user_prompt_override: Option<String>,
}

/// Façade over one conversation.
pub struct ConversationOrchestrator {
    conversation_id: String,
    kind: ConversationKind,
    repo: RwLock<MessageRepository>,
    op_lock: Mutex<()>,
    assembler: ContextAssembler,
    composer: Arc<PromptComposer>,
    executor: ToolLoopExecutor,
    tools: Arc<ToolRegistry>,
    settings: OrchestratorSettings,
    rate_notice: RateLimitNotice,
    event_bus: Arc<EventBus>,
}

impl ConversationOrchestrator {
    pub fn new(
        kind: ConversationKind,
        assembler: ContextAssembler,
        composer: Arc<PromptComposer>,
        client: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let settings = OrchestratorSettings::default();
        let event_bus = Arc::new(EventBus::default());
        let executor = ToolLoopExecutor::new(client, tools.clone())
            .with_max_iterations(settings.max_tool_iterations)
            .with_events(event_bus.clone());
        Self {
            conversation_id: Uuid::new_v4().to_string(),
            kind,
            repo: RwLock::new(MessageRepository::new()),
            op_lock: Mutex::new(()),
            assembler,
            composer,
            executor,
            tools,
            rate_notice: RateLimitNotice::new(settings.rate_limit_notice),
            settings,
            event_bus,
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.executor = self.executor.with_max_iterations(settings.max_tool_iterations);
        self.rate_notice = RateLimitNotice::new(settings.rate_limit_notice);
        self.settings = settings;
        self
    }

    /// Publish on a shared bus instead of a private one.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.executor = self.executor.with_events(bus.clone());
        self.event_bus = bus;
        self
    }

    /// Start from previously saved turns.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.repo.get_mut().load(messages);
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn kind(&self) -> &ConversationKind {
        &self.kind
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Record a user turn and generate the reply.
    ///
    /// Returns `Ok(false)` when no reply could be produced; the user turn
    /// stays and a display-only notice explains what happened. A blank
    /// message is rejected with [`Error::Validation`].
    pub async fn send_message(
        &self,
        raw: &str,
        context: MessageContext,
        options: &TurnOptions,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let _op = self.op_lock.lock().await;
        let id = self
            .repo
            .write()
            .await
            .add_message(raw, raw, Sender::User, context, None)?;
        self.publish_added(&id, Sender::User);
        Ok(self.respond_to(&id, options, cancel).await)
    }

    /// Edit a turn. See [`Self::edit_message_with_context`].
    pub async fn edit_message(
        &self,
        id: &str,
        new_raw: &str,
        options: &TurnOptions,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        self.edit_message_with_context(id, new_raw, None, options, cancel)
            .await
    }

    /// Edit a turn, optionally replacing its references.
    ///
    /// A user turn keeps its id, is reprocessed once, loses every later turn
    /// and gets a fresh reply. An assistant turn is edited in place.
    pub async fn edit_message_with_context(
        &self,
        id: &str,
        new_raw: &str,
        context: Option<MessageContext>,
        options: &TurnOptions,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let _op = self.op_lock.lock().await;
        let Some(sender) = self.repo.read().await.get(id).map(|m| m.sender) else {
            return Ok(false);
        };

        match sender {
            Sender::Assistant => {
                let mut repo = self.repo.write().await;
                repo.edit_message(id, new_raw);
                repo.update_processed_text(id, new_raw, None);
                debug!(id = %id, "Assistant turn edited in place");
                Ok(true)
            }
            Sender::User => {
                if new_raw.trim().is_empty() {
                    return Err(Error::Validation("user message text is empty".into()));
                }
                {
                    let mut repo = self.repo.write().await;
                    repo.edit_message(id, new_raw);
                    if let Some(context) = context {
                        repo.replace_context(id, context);
                    }
                    repo.truncate_after_message_id(id);
                }
                info!(id = %id, "User turn edited, regenerating");
                Ok(self.respond_to(id, options, cancel).await)
            }
        }
    }

    /// Regenerate the reply to a turn.
    ///
    /// For an assistant turn the user turn it answers is resent. Returns
    /// `false` without touching anything for the first turn of the
    /// conversation or an unknown id.
    pub async fn regenerate_message(
        &self,
        id: &str,
        options: &TurnOptions,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let _op = self.op_lock.lock().await;
        let user_id = {
            let repo = self.repo.read().await;
            let Some(index) = repo.index_of(id) else {
                return Ok(false);
            };
            if index == 0 {
                debug!(id = %id, "Nothing before the first turn to regenerate from");
                return Ok(false);
            }
            let message = &repo.display_messages()[index];
            match message.sender {
                Sender::User => Some(message.id.clone()),
                Sender::Assistant => message
                    .parent_id
                    .clone()
                    .filter(|parent| repo.get(parent).is_some())
                    .or_else(|| repo.previous_user_message(id).map(|m| m.id.clone())),
            }
        };
        let Some(user_id) = user_id else {
            return Ok(false);
        };

        self.repo.write().await.truncate_after_message_id(&user_id);
        info!(id = %user_id, "Regenerating reply");
        Ok(self.respond_to(&user_id, options, cancel).await)
    }

    /// Append a turn without generating anything.
    pub async fn add_message(
        &self,
        raw: &str,
        sender: Sender,
        context: MessageContext,
    ) -> Result<String> {
        let _op = self.op_lock.lock().await;
        let id = self
            .repo
            .write()
            .await
            .add_message(raw, raw, sender, context, None)?;
        self.publish_added(&id, sender);
        Ok(id)
    }

    pub async fn truncate_after_message_id(&self, id: &str) -> bool {
        let _op = self.op_lock.lock().await;
        self.repo.write().await.truncate_after_message_id(id)
    }

    pub async fn delete_message(&self, id: &str) -> bool {
        let _op = self.op_lock.lock().await;
        self.repo.write().await.delete_message(id)
    }

    pub async fn clear(&self) {
        let _op = self.op_lock.lock().await;
        self.repo.write().await.clear();
    }

    pub async fn display_messages(&self) -> Vec<Message> {
        self.repo.read().await.display_messages().to_vec()
    }

    pub async fn llm_messages(&self) -> Vec<ChatMessage> {
        self.repo.read().await.llm_messages()
    }

    /// Compose, enrich and run the loop for the user turn `user_id`, which
    /// must be the last turn. Callers hold the operation lock.
    async fn respond_to(
        &self,
        user_id: &str,
        options: &TurnOptions,
        cancel: &CancellationToken,
    ) -> bool {
        let tools_offered = self.kind.uses_tools() && !self.tools.is_empty();
        let composed = self
            .composer
            .compose(
                &self.kind,
                &ComposeOptions {
                    memory: options.memory.clone(),
                    active_note: options.active_note.clone(),
                    tools_offered,
                    user_prompt_override: options.user_prompt_override.clone(),
                },
            )
            .await;

        let request = ContextRequest {
            kind: self.kind.clone(),
            include_active_note: self.settings.include_active_note,
            active_note: options.active_note.clone(),
            base_system_prompt: composed.text.clone(),
            system_prompt_included_files: composed.included_files,
        };
        if !self
            .assembler
            .reprocess_message_context(user_id, &self.repo, &request)
            .await
        {
            warn!(id = %user_id, "Turn vanished before it could be processed");
            return false;
        }

        let model_request = ModelRequest {
            model: self.settings.model.clone(),
            system_prompt: composed.text,
            messages: self.repo.read().await.llm_messages(),
            tools: if tools_offered {
                self.tools.definitions()
            } else {
                Vec::new()
            },
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let result = match self.executor.run(model_request, cancel).await {
            Ok(result) => result,
            Err(e) => {
                self.report_failure(e).await;
                return false;
            }
        };

        let reply = self.repo.write().await.add_message(
            &result.content,
            &result.content,
            Sender::Assistant,
            MessageContext::default(),
            Some(user_id.to_string()),
        );
        let reply_id = match reply {
            Ok(id) => id,
            Err(e) => {
                self.report_failure(e).await;
                return false;
            }
        };
        self.publish_added(&reply_id, Sender::Assistant);

        if result.outcome == LoopOutcome::IterationLimit {
            warn!(id = %reply_id, iterations = result.iterations, "Reply cut short by the iteration limit");
        }
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            conversation_id: self.conversation_id.clone(),
            model: result.model,
            tokens_used: result.usage.total_tokens,
            iterations: result.iterations,
            timestamp: Utc::now(),
        });
        true
    }

    /// Turn a failed generation into a display-only notice.
    async fn report_failure(&self, error: Error) {
        let notice = match &error {
            Error::Cancelled => {
                info!(conversation_id = %self.conversation_id, "Turn cancelled");
                return;
            }
            Error::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                warn!(retry_after_secs, "Provider rate limit hit");
                self.rate_notice
                    .should_notify()
                    .then(|| RateLimitNotice::message(*retry_after_secs))
            }
            other => {
                warn!(error = %other, "Reply generation failed");
                Some(format!("Something went wrong while generating a reply: {other}"))
            }
        };

        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: format!("conversation {}", self.conversation_id),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });

        if let Some(text) = notice {
            let id = self
                .repo
                .write()
                .await
                .add_display_only(text, Sender::Assistant);
            self.publish_added(&id, Sender::Assistant);
        }
    }

    fn publish_added(&self, message_id: &str, sender: Sender) {
        let sender = match sender {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        };
        self.event_bus.publish(DomainEvent::MessageAdded {
            conversation_id: self.conversation_id.clone(),
            message_id: message_id.to_string(),
            sender: sender.to_string(),
            timestamp: Utc::now(),
        });
    }
}
