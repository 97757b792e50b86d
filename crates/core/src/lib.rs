//! # Noteloom Core
//!
//! Domain types, collaborator traits, and error definitions for the Noteloom
//! assistant core. This crate has **no framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! Every external collaborator (file store, model client, tools, document
//! conversion, templating) is a trait here. Implementations live in their own
//! crates and are passed in through constructors.

pub mod enrich;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod template;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use enrich::{DocumentParser, NoopParser, Reference};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{
    ContextEnvelope, ConversationKind, Message, MessageContext, NoteRef, ProjectProfile,
    SelectedText, Sender,
};
pub use provider::{ChatMessage, ChatRole, ModelClient, ModelRequest, ModelResponse, ToolDefinition, Usage};
pub use store::{FileChange, FileChangeKind, FileStore};
pub use template::{TemplateContext, TemplateEngine, TemplateOutput};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};

/// Re-exported so downstream crates share one cancellation token type.
pub use tokio_util::sync::CancellationToken;
