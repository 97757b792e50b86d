//! List notes tool: enumerate notes in a vault folder.

use async_trait::async_trait;
use noteloom_core::error::ToolError;
use noteloom_core::store::FileStore;
use noteloom_core::tool::{Tool, ToolResult};
use std::sync::Arc;

pub struct ListNotesTool {
    files: Arc<dyn FileStore>,
}

impl ListNotesTool {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "list_notes"
    }

    fn description(&self) -> &str {
        "List the markdown notes in a vault folder (recursively). \
         Leave 'folder' empty to list the whole vault."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "folder": {
                    "type": "string",
                    "description": "Vault-relative folder, empty for the vault root"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of paths to return (default 100)",
                    "default": 100
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let folder = arguments["folder"].as_str().unwrap_or("");
        let limit = arguments["limit"].as_u64().unwrap_or(100) as usize;

        let paths = self
            .files
            .list(folder)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_notes".into(),
                reason: e.to_string(),
            })?;
        let notes: Vec<String> = paths
            .into_iter()
            .filter(|p| p.to_lowercase().ends_with(".md"))
            .collect();
        let total = notes.len();

        if total == 0 {
            return Ok(ToolResult::success("", "", "No notes found."));
        }

        let mut output = notes.iter().take(limit).cloned().collect::<Vec<_>>().join("\n");
        if total > limit {
            output.push_str(&format!("\n... and {} more", total - limit));
        }
        Ok(ToolResult::success("", "", output).with_data(serde_json::json!({ "total": total })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteloom_store::InMemoryFileStore;

    async fn tool() -> ListNotesTool {
        let files = InMemoryFileStore::new();
        files
            .seed([
                ("projects/a.md", ""),
                ("projects/b.md", ""),
                ("projects/diagram.png", ""),
                ("daily/c.md", ""),
            ])
            .await;
        ListNotesTool::new(Arc::new(files))
    }

    #[tokio::test]
    async fn lists_markdown_in_folder() {
        let result = tool()
            .await
            .execute(serde_json::json!({"folder": "projects"}))
            .await
            .unwrap();
        assert_eq!(result.output, "projects/a.md\nprojects/b.md");
    }

    #[tokio::test]
    async fn limit_reports_remainder() {
        let result = tool()
            .await
            .execute(serde_json::json!({"limit": 1}))
            .await
            .unwrap();
        assert_eq!(result.output, "daily/c.md\n... and 2 more");
        assert_eq!(result.data.unwrap()["total"], 3);
    }

    #[tokio::test]
    async fn empty_folder() {
        let result = tool()
            .await
            .execute(serde_json::json!({"folder": "archive"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "No notes found.");
    }
}
