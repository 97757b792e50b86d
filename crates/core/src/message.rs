//! Message and conversation domain types.
//!
//! A conversation turn keeps both what the user typed (`raw_text`) and what
//! the model actually sees (`processed_text`, with referenced notes and URLs
//! inlined by context processing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

/// A reference to a note in the vault, by vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteRef(pub String);

impl NoteRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// The note title: the file name without its extension.
    pub fn title(&self) -> &str {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// Lower-cased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        name.rfind('.')
            .filter(|idx| *idx > 0)
            .map(|idx| name[idx + 1..].to_lowercase())
    }

    pub fn is_markdown(&self) -> bool {
        matches!(self.extension().as_deref(), Some("md"))
    }
}

impl std::fmt::Display for NoteRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fragment of text the user highlighted in a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedText {
    /// Note the fragment was taken from
    pub note: NoteRef,
    /// The selected content
    pub content: String,
}

/// References attached to a message when it is created.
///
/// Notes and URLs behave as ordered sets: insertion order is kept and
/// duplicates are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<NoteRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected_text: Vec<SelectedText>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a note. Returns false if it was already attached.
    pub fn add_note(&mut self, note: NoteRef) -> bool {
        if self.notes.contains(&note) {
            return false;
        }
        self.notes.push(note);
        true
    }

    /// Attach a URL. Returns false if it was already attached.
    pub fn add_url(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.urls.contains(&url) {
            return false;
        }
        self.urls.push(url);
        true
    }

    pub fn add_selected_text(&mut self, note: NoteRef, content: impl Into<String>) {
        self.selected_text.push(SelectedText {
            note,
            content: content.into(),
        });
    }

    pub fn with_note(mut self, note: NoteRef) -> Self {
        self.add_note(note);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.add_url(url);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.urls.is_empty() && self.selected_text.is_empty()
    }
}

/// What context processing actually did for a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    /// Notes whose content was inlined
    #[serde(default)]
    pub included_notes: Vec<NoteRef>,

    /// URLs whose content was inlined
    #[serde(default)]
    pub included_urls: Vec<String>,

    /// Notes skipped because the system prompt already carries them
    #[serde(default)]
    pub skipped_notes: Vec<NoteRef>,

    /// Per-reference failures, keyed by the reference
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Text as authored
    pub raw_text: String,

    /// Text as sent to the model (raw text plus inlined context)
    pub processed_text: String,

    /// Who sent this message
    pub sender: Sender,

    /// References attached at creation, replaceable on edit
    #[serde(default)]
    pub context: MessageContext,

    /// Outcome of the last context processing run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<ContextEnvelope>,

    /// The turn this one answers (assistant turns point at their user turn)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Whether the model sees this turn
    pub is_visible: bool,

    /// Timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        raw_text: impl Into<String>,
        processed_text: impl Into<String>,
        sender: Sender,
        context: MessageContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            raw_text: raw_text.into(),
            processed_text: processed_text.into(),
            sender,
            context,
            envelope: None,
            parent_id: None,
            is_visible: true,
            created_at: Utc::now(),
        }
    }

    /// Create a user message with no attached context.
    pub fn user(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(text.clone(), text, Sender::User, MessageContext::default())
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(text.clone(), text, Sender::Assistant, MessageContext::default())
    }
}

/// A project profile scoping a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub name: String,

    /// Project-specific instructions, may contain template placeholders
    #[serde(default)]
    pub system_prompt: String,

    /// Pre-loaded project context (notes, web pages) rendered as one block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The kind of conversation being held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConversationKind {
    /// Plain chat: no tools, URLs stay as text
    #[default]
    Chat,
    /// Tool-calling agent
    Agent,
    /// Project-scoped agent with its own prompt layer
    Project(ProjectProfile),
}

impl ConversationKind {
    /// Whether URL references get their content fetched.
    pub fn fetches_urls(&self) -> bool {
        !matches!(self, Self::Chat)
    }

    /// Whether the tool loop is offered tools.
    pub fn uses_tools(&self) -> bool {
        !matches!(self, Self::Chat)
    }

    pub fn project(&self) -> Option<&ProjectProfile> {
        match self {
            Self::Project(profile) => Some(profile),
            _ => None,
        }
    }
}
