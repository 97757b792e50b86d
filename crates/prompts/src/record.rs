//! Saved prompt records and their on-disk format.
//!
//! A prompt is a markdown file whose name is the prompt title. Timestamps
//! live in a frontmatter block at the top of the file:
//!
//! ```text
//! ---
//! noteloom-prompt-created: 2026-01-05T10:00:00+00:00
//! noteloom-prompt-modified: 2026-01-06T08:30:00+00:00
//! noteloom-prompt-last-used: 2026-01-07T12:00:00+00:00
//! ---
//! You are terse. Answer in bullet points.
//! ```
//!
//! Other frontmatter keys written by the user are preserved on rewrite.

use chrono::{DateTime, Utc};

pub const CREATED_KEY: &str = "noteloom-prompt-created";
pub const MODIFIED_KEY: &str = "noteloom-prompt-modified";
pub const LAST_USED_KEY: &str = "noteloom-prompt-last-used";

const FENCE: &str = "---";

/// A saved system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRecord {
    /// Unique key, equal to the file stem
    pub title: String,

    /// Prompt body without frontmatter
    pub content: String,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PromptRecord {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            content: content.into(),
            created_at: now,
            modified_at: now,
            last_used_at: None,
        }
    }

    /// Parse a prompt file. Missing or malformed timestamps fall back to `now`.
    pub fn parse(title: impl Into<String>, text: &str, now: DateTime<Utc>) -> Self {
        let (fields, body) = split_frontmatter(text);
        let lookup = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .and_then(|(_, v)| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };
        Self {
            title: title.into(),
            content: body.to_string(),
            created_at: lookup(CREATED_KEY).unwrap_or(now),
            modified_at: lookup(MODIFIED_KEY).unwrap_or(now),
            last_used_at: lookup(LAST_USED_KEY),
        }
    }

    /// Render the full file text. The content goes below a fresh
    /// frontmatter block verbatim, even when it starts with `---` itself.
    pub fn to_file_text(&self) -> String {
        let fields: Vec<(String, String)> = self
            .metadata()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        render(&fields, &self.content)
    }

    fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            (CREATED_KEY, self.created_at.to_rfc3339()),
            (MODIFIED_KEY, self.modified_at.to_rfc3339()),
        ];
        if let Some(last_used) = self.last_used_at {
            fields.push((LAST_USED_KEY, last_used.to_rfc3339()));
        }
        fields
    }
}

/// Whether the file already carries the created and modified timestamps.
pub fn has_metadata(text: &str) -> bool {
    let (fields, _) = split_frontmatter(text);
    [CREATED_KEY, MODIFIED_KEY]
        .iter()
        .all(|key| fields.iter().any(|(k, _)| k == key))
}

/// The file body with any frontmatter block removed.
pub fn strip_frontmatter(text: &str) -> &str {
    split_frontmatter(text).1
}

/// Rewrite `text` so its frontmatter carries `record`'s timestamps, keeping
/// the existing body and any unrelated frontmatter keys.
pub fn with_metadata(text: &str, record: &PromptRecord) -> String {
    let (mut fields, body) = split_frontmatter(text);
    for (key, value) in record.metadata() {
        match fields.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => fields.push((key.to_string(), value)),
        }
    }

    render(&fields, body)
}

fn render(fields: &[(String, String)], body: &str) -> String {
    let mut out = String::from(FENCE);
    out.push('\n');
    for (key, value) in fields {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(body);
    out
}

/// Split a leading `---` block into key/value pairs and the remaining body.
///
/// Text without a closed frontmatter block is returned whole as the body.
fn split_frontmatter(text: &str) -> (Vec<(String, String)>, &str) {
    let Some(rest) = text
        .strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))
    else {
        return (Vec::new(), text);
    };

    let mut fields = Vec::new();
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == FENCE {
            return (fields, &rest[offset..]);
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            fields.push((key.trim().to_string(), value.to_string()));
        }
    }

    // Unterminated block
    (Vec::new(), text)
}
