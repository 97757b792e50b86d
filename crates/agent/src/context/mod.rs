//! Everything that shapes what the model sees for a turn.
//!
//! - [`assembler`] inlines the notes, URLs and selections a message refers to
//! - [`template`] expands placeholders in prompt layers
//! - [`token`] estimates token counts when the provider reports none

pub mod assembler;
pub mod template;
pub mod token;

pub use assembler::{ContextAssembler, ContextRequest, ProcessedContext};
pub use template::NoteTemplateEngine;
