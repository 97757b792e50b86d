//! Built-in vault tools for Noteloom.
//!
//! Tools let the assistant look around the vault on its own during an
//! agent turn: read a note, list a folder, search note text. All of them
//! work through the injected [`FileStore`], never the real file system.

pub mod list_notes;
pub mod read_note;
pub mod search_notes;

use noteloom_core::store::FileStore;
use noteloom_core::tool::ToolRegistry;
use std::sync::Arc;

pub use list_notes::ListNotesTool;
pub use read_note::ReadNoteTool;
pub use search_notes::SearchNotesTool;

/// Create a registry with every built-in vault tool.
pub fn default_registry(files: Arc<dyn FileStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadNoteTool::new(files.clone())));
    registry.register(Box::new(ListNotesTool::new(files.clone())));
    registry.register(Box::new(SearchNotesTool::new(files)));
    registry
}
