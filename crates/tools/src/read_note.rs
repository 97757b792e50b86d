//! Read note tool: return the content of one vault note.

use async_trait::async_trait;
use noteloom_core::error::{StoreError, ToolError};
use noteloom_core::store::FileStore;
use noteloom_core::tool::{Tool, ToolResult};
use std::sync::Arc;

/// Longest note body handed back to the model, in characters.
const MAX_NOTE_CHARS: usize = 20_000;

pub struct ReadNoteTool {
    files: Arc<dyn FileStore>,
}

impl ReadNoteTool {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl Tool for ReadNoteTool {
    fn name(&self) -> &str {
        "read_note"
    }

    fn description(&self) -> &str {
        "Read the full text of a note in the vault. \
         Pass the vault-relative path, e.g. 'projects/roadmap.md'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Vault-relative path of the note"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        match self.files.read(path).await {
            Ok(content) => {
                let total = content.chars().count();
                let mut output: String = content.chars().take(MAX_NOTE_CHARS).collect();
                if total > MAX_NOTE_CHARS {
                    output.push_str(&format!("\n\n[truncated, {total} characters in total]"));
                }
                Ok(ToolResult::success("", "", output)
                    .with_data(serde_json::json!({ "path": path, "chars": total })))
            }
            Err(StoreError::NotFound(_)) => Ok(ToolResult::failure(
                "",
                "",
                format!("Note not found: {path}"),
            )),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: "read_note".into(),
                reason: e.to_string(),
            }),
        }
    }
}
