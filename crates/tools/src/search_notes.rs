//! Search notes tool: case-insensitive keyword search across the vault.
//!
//! Notes are ranked by how often the query occurs, normalized by note
//! length, and each hit carries a short snippet around the first match.

use async_trait::async_trait;
use noteloom_core::error::ToolError;
use noteloom_core::store::FileStore;
use noteloom_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::debug;

const SNIPPET_RADIUS: usize = 80;

pub struct SearchNotesTool {
    files: Arc<dyn FileStore>,
}

impl SearchNotesTool {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }
}

struct Hit {
    path: String,
    score: f32,
    snippet: String,
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "search_notes"
    }

    fn description(&self) -> &str {
        "Search the text of all notes in the vault for a keyword or phrase. \
         Returns the best matching note paths with a snippet of each."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keyword or phrase to look for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of notes to return (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let limit = arguments["limit"].as_u64().unwrap_or(5) as usize;
        let needle = query.to_lowercase();

        let paths = self
            .files
            .list("")
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "search_notes".into(),
                reason: e.to_string(),
            })?;

        let mut hits = Vec::new();
        for path in paths.into_iter().filter(|p| p.to_lowercase().ends_with(".md")) {
            let Ok(content) = self.files.read(&path).await else {
                continue;
            };
            let lower = content.to_lowercase();
            let occurrences = lower.matches(&needle).count();
            if occurrences == 0 {
                continue;
            }
            let score = occurrences as f32 / (content.len() as f32 / 100.0).max(1.0);
            let snippet = lower
                .find(&needle)
                .map(|at| snippet_around(&content, at, needle.len()))
                .unwrap_or_default();
            hits.push(Hit { path, score, snippet });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        hits.truncate(limit);
        debug!(query = %query, hits = hits.len(), "Vault searched");

        if hits.is_empty() {
            return Ok(ToolResult::success("", "", format!("No notes mention '{query}'.")));
        }

        let output = hits
            .iter()
            .map(|h| format!("- {}: {}", h.path, h.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        let data = serde_json::json!(hits.iter().map(|h| &h.path).collect::<Vec<_>>());
        Ok(ToolResult::success("", "", output).with_data(data))
    }
}

/// Text around a match, cut on char boundaries with newlines flattened.
///
/// `at` comes from the lowercased text; lowercasing can shift byte offsets
/// for some scripts, so the window is clamped to the original's boundaries.
fn snippet_around(content: &str, at: usize, len: usize) -> String {
    let mut start = at.saturating_sub(SNIPPET_RADIUS).min(content.len());
    while !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (at + len + SNIPPET_RADIUS).min(content.len());
    while !content.is_char_boundary(end) {
        end += 1;
    }
    let mut snippet = content[start..end].replace('\n', " ");
    if start > 0 {
        snippet.insert(0, '…');
    }
    if end < content.len() {
        snippet.push('…');
    }
    snippet
}
