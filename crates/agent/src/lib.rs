//! Conversation orchestration for Noteloom.
//!
//! A turn flows through these pieces:
//!
//! 1. **Record** the user message in the [`MessageRepository`]
//! 2. **Compose** the system prompt (`noteloom-prompts`)
//! 3. **Enrich** the message with the notes and URLs it references
//! 4. **Loop** model calls and tool batches until the model answers
//! 5. **Record** the reply, or a display-only notice when generation failed
//!
//! [`ConversationOrchestrator`] drives the whole sequence for one
//! conversation.

pub mod context;
pub mod orchestrator;
pub mod rate_limit;
pub mod repository;
pub mod tool_loop;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{ContextAssembler, ContextRequest, NoteTemplateEngine, ProcessedContext};
pub use orchestrator::{ConversationOrchestrator, OrchestratorSettings, TurnOptions};
pub use rate_limit::RateLimitNotice;
pub use repository::MessageRepository;
pub use tool_loop::{LoopOutcome, LoopResult, LoopState, ToolLoopExecutor};
