//! Template engine collaborator used by the prompt composer.
//!
//! A prompt layer may contain placeholders such as `{activeNote}` or
//! `{[[Some Note]]}`. The engine expands them and reports which notes it
//! consumed so context processing does not inline them a second time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::message::NoteRef;

/// Inputs a placeholder may refer to.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// The note currently open in the editor, if any
    pub active_note: Option<NoteRef>,
}

impl TemplateContext {
    pub fn with_active_note(active_note: Option<NoteRef>) -> Self {
        Self { active_note }
    }
}

/// Result of running a layer through the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateOutput {
    pub text: String,

    /// Vault paths whose content the engine inlined
    #[serde(default)]
    pub included_files: Vec<String>,
}

/// The template engine collaborator.
///
/// Implementations must leave an empty placeholder body (`{}`) as literal
/// text.
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn process(
        &self,
        text: &str,
        context: &TemplateContext,
    ) -> std::result::Result<TemplateOutput, TemplateError>;
}

/// Whether `text` contains anything that could be a placeholder: an opening
/// brace followed somewhere later by a closing brace.
pub fn has_placeholder_syntax(text: &str) -> bool {
    match text.find('{') {
        Some(open) => text[open + 1..].contains('}'),
        None => false,
    }
}
