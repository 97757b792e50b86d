//! Layered system prompt composition.
//!
//! Layers, in order:
//! 1. memory (a distilled summary of earlier conversations, never templated)
//! 2. the builtin instructions, unless disabled
//! 3. the user's custom instructions, wrapped in `<user_custom_instructions>`
//! 4. for project conversations, the project prompt and optional context
//! 5. tool-use guidance, when tools are offered
//!
//! The user and project layers may contain placeholders. They only go through
//! the template engine when they contain a brace pair.

use noteloom_core::message::{ConversationKind, NoteRef};
use noteloom_core::template::{TemplateContext, TemplateEngine, has_placeholder_syntax};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::store::PromptStore;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Noteloom, an assistant that lives inside the user's note vault.
Answer using the notes, links and selections provided with each message when they are relevant, and say so when they are not enough.
Refer to notes by their title in [[double brackets]].
Keep answers in markdown and never invent the content of a note you have not been shown.";

pub const TOOL_USE_GUIDANCE: &str = "<tool_use_guidelines>
Tools are available for reading and searching the vault.
Once the results you already have are enough to answer, answer instead of calling another tool.
Never call the same tool more than once for materially the same request within a turn.
</tool_use_guidelines>";

/// Per-call inputs to [`PromptComposer::compose`].
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// Memory layer text, prepended verbatim
    pub memory: Option<String>,

    /// The note open in the editor, for `{activeNote}`
    pub active_note: Option<NoteRef>,

    /// Whether the request offers tools to the model
    pub tools_offered: bool,

    /// Custom instructions to use instead of the saved default prompt
    pub user_prompt_override: Option<String>,
}

/// The final instruction text and the notes templating inlined into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub text: String,
    pub included_files: Vec<String>,
}

enum UserSource {
    Override,
    Saved(String),
    Legacy,
    None,
}

pub struct PromptComposer {
    store: Arc<PromptStore>,
    engine: Arc<dyn TemplateEngine>,
}

impl PromptComposer {
    pub fn new(store: Arc<PromptStore>, engine: Arc<dyn TemplateEngine>) -> Self {
        Self { store, engine }
    }

    /// Build the system prompt. Never fails: templating problems fall back to
    /// the raw layer text.
    pub async fn compose(&self, kind: &ConversationKind, options: &ComposeOptions) -> ComposedPrompt {
        let settings = self.store.settings_snapshot();
        let template_context = TemplateContext::with_active_note(options.active_note.clone());

        let builtin = if settings.disable_builtin { "" } else { DEFAULT_SYSTEM_PROMPT };
        let (user_raw, source) = self.resolve_user_layer(options, &settings).await;

        let base = join_layers([builtin.to_string(), user_block(&user_raw)]);
        let decorated = match options.memory.as_deref() {
            Some(memory) if !memory.trim().is_empty() => join_layers([memory.to_string(), base.clone()]),
            _ => base.clone(),
        };

        let mut included_files = Vec::new();
        let mut text = decorated.clone();
        if let Some(processed) = self.substitute(&user_raw, &template_context, &mut included_files).await {
            let processed_base = join_layers([builtin.to_string(), user_block(&processed)]);
            match splice_layer(&decorated, &base, &processed_base) {
                Some(spliced) => text = spliced,
                None => included_files.clear(),
            }
        }

        let mut trailing = Vec::new();
        if let Some(project) = kind.project() {
            let project_prompt = self
                .substitute(&project.system_prompt, &template_context, &mut included_files)
                .await
                .unwrap_or_else(|| project.system_prompt.clone());
            if !project_prompt.trim().is_empty() {
                trailing.push(format!(
                    "<project_system_prompt>\n{project_prompt}\n</project_system_prompt>"
                ));
            }
            if let Some(context) = project.context.as_deref().filter(|c| !c.trim().is_empty()) {
                trailing.push(format!("<project_context>\n{context}\n</project_context>"));
            }
        }
        if options.tools_offered {
            trailing.push(TOOL_USE_GUIDANCE.to_string());
        }
        let text = join_layers(std::iter::once(text).chain(trailing));

        if let UserSource::Saved(title) = source {
            if let Err(e) = self.store.touch_last_used(&title).await {
                warn!(title = %title, error = %e, "Could not record prompt use");
            }
        }

        dedup_in_place(&mut included_files);
        debug!(chars = text.len(), included = included_files.len(), "System prompt composed");
        ComposedPrompt { text, included_files }
    }

    async fn resolve_user_layer(
        &self,
        options: &ComposeOptions,
        settings: &noteloom_config::PromptsConfig,
    ) -> (String, UserSource) {
        if let Some(text) = &options.user_prompt_override {
            return (text.clone(), UserSource::Override);
        }
        if let Some(title) = &settings.default_prompt_title {
            if let Some(record) = self.store.cache().get(title).await {
                return (record.content, UserSource::Saved(title.clone()));
            }
            debug!(title = %title, "Default prompt not cached");
        }
        if !settings.user_system_prompt.trim().is_empty() {
            return (settings.user_system_prompt.clone(), UserSource::Legacy);
        }
        (String::new(), UserSource::None)
    }

    /// Run one layer through the template engine.
    ///
    /// `None` means the layer was left alone, either because it has no
    /// placeholder syntax or because the engine failed.
    async fn substitute(
        &self,
        layer: &str,
        context: &TemplateContext,
        included_files: &mut Vec<String>,
    ) -> Option<String> {
        if !has_placeholder_syntax(layer) {
            return None;
        }
        match self.engine.process(layer, context).await {
            Ok(output) => {
                included_files.extend(output.included_files);
                Some(output.text.trim_end().to_string())
            }
            Err(e) => {
                warn!(error = %e, "Prompt templating failed, using the layer as written");
                None
            }
        }
    }
}

fn user_block(text: &str) -> String {
    if text.trim().is_empty() {
        String::new()
    } else {
        format!("<user_custom_instructions>\n{text}\n</user_custom_instructions>")
    }
}

fn join_layers(layers: impl IntoIterator<Item = String>) -> String {
    layers
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replace the trailing `base` of `decorated` with `processed_base`.
///
/// `decorated` always ends with `base`. If it does not, the two were built
/// from diverging inputs and `None` tells the caller to keep `decorated`.
fn splice_layer(decorated: &str, base: &str, processed_base: &str) -> Option<String> {
    match decorated.strip_suffix(base) {
        Some(prefix) => Some(format!("{prefix}{processed_base}")),
        None => {
            error!(
                decorated_len = decorated.len(),
                base_len = base.len(),
                "Composed prompt does not end with the builtin and user layers; templating discarded"
            );
            None
        }
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
