//! Saved system prompts for Noteloom.
//!
//! Prompts are markdown files in a vault folder. [`PromptStore`] maps titles
//! to files, [`PromptCache`] mirrors them in memory, [`PromptSync`] keeps the
//! mirror current as files change on disk, and [`PromptComposer`] layers the
//! chosen prompt into the final system prompt.

pub mod cache;
pub mod composer;
pub mod migration;
pub mod record;
pub mod store;
pub mod sync;

pub use cache::{PendingWriteGuard, PromptCache};
pub use composer::{ComposeOptions, ComposedPrompt, PromptComposer};
pub use migration::migrate_legacy_prompt;
pub use record::PromptRecord;
pub use store::PromptStore;
pub use sync::PromptSync;
