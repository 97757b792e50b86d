//! Placeholder expansion for prompt text.
//!
//! A placeholder is a `{...}` span. Recognised bodies:
//!
//! | Body | Expands to |
//! |------|------------|
//! | `activeNote` | the note the user is looking at |
//! | `[[Title]]` | the first markdown note with that title |
//! | `#tag` | every markdown note mentioning the tag |
//! | `folder/path` | every markdown note under the folder |
//!
//! The placeholder stays in the text and the note contents are appended as
//! `<variable name="...">` blocks. Empty bodies (`{}`) and anything that
//! resolves to nothing are left alone.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use noteloom_core::error::{StoreError, TemplateError};
use noteloom_core::message::NoteRef;
use noteloom_core::store::{FileStore, normalize_path};
use noteloom_core::template::{TemplateContext, TemplateEngine, TemplateOutput};
use regex_lite::Regex;
use tracing::{debug, warn};

const PLACEHOLDER: &str = r"\{([^{}]*)\}";
const ACTIVE_NOTE: &str = "activeNote";

/// Template engine that expands placeholders from the vault.
pub struct NoteTemplateEngine {
    files: Arc<dyn FileStore>,
}

impl NoteTemplateEngine {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }

    async fn resolve(
        &self,
        body: &str,
        context: &TemplateContext,
    ) -> Result<Vec<(NoteRef, String)>, TemplateError> {
        if body == ACTIVE_NOTE {
            let Some(note) = &context.active_note else {
                return Ok(Vec::new());
            };
            return self.read_all(vec![note.clone()]).await;
        }

        if let Some(title) = body.strip_prefix("[[").and_then(|b| b.strip_suffix("]]")) {
            let title = title.trim();
            let found = self
                .markdown_notes("")
                .await?
                .into_iter()
                .find(|n| n.title() == title);
            return self.read_all(found.into_iter().collect()).await;
        }

        if let Some(tag) = body.strip_prefix('#') {
            if tag.is_empty() || tag.contains(char::is_whitespace) {
                return Ok(Vec::new());
            }
            let needle = format!("#{tag}");
            let notes = self.read_all(self.markdown_notes("").await?).await?;
            return Ok(notes
                .into_iter()
                .filter(|(_, content)| mentions_tag(content, &needle))
                .collect());
        }

        // The vault root is never a folder placeholder
        let folder = normalize_path(body);
        if folder.is_empty() || folder.split('/').any(|seg| seg == "..") {
            return Ok(Vec::new());
        }
        let notes = self.markdown_notes(&folder).await?;
        self.read_all(notes).await
    }

    async fn markdown_notes(&self, prefix: &str) -> Result<Vec<NoteRef>, TemplateError> {
        let mut paths = self
            .files
            .list(prefix)
            .await
            .map_err(|e| TemplateError(format!("listing '{prefix}': {e}")))?;
        paths.sort();
        Ok(paths
            .into_iter()
            .map(NoteRef::new)
            .filter(NoteRef::is_markdown)
            .collect())
    }

    /// Read each note. Notes that vanished in the meantime are skipped.
    async fn read_all(
        &self,
        notes: Vec<NoteRef>,
    ) -> Result<Vec<(NoteRef, String)>, TemplateError> {
        let mut out = Vec::with_capacity(notes.len());
        for note in notes {
            match self.files.read(note.path()).await {
                Ok(content) => out.push((note, content)),
                Err(StoreError::NotFound(_)) => {
                    warn!(path = %note, "Placeholder note not found");
                }
                Err(e) => return Err(TemplateError(format!("reading '{note}': {e}"))),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl TemplateEngine for NoteTemplateEngine {
    async fn process(
        &self,
        text: &str,
        context: &TemplateContext,
    ) -> Result<TemplateOutput, TemplateError> {
        let re = Regex::new(PLACEHOLDER).map_err(|e| TemplateError(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut blocks = Vec::new();
        let mut included_files: Vec<String> = Vec::new();

        for caps in re.captures_iter(text) {
            let body = caps.get(1).map_or("", |m| m.as_str()).trim();
            if body.is_empty() || !seen.insert(body.to_string()) {
                continue;
            }

            let notes = self.resolve(body, context).await?;
            if notes.is_empty() {
                debug!(placeholder = %body, "Placeholder left as literal text");
                continue;
            }

            let sections: Vec<String> = notes
                .iter()
                .map(|(note, content)| {
                    format!(
                        "<title>{}</title>\n<path>{}</path>\n<content>\n{}\n</content>",
                        note.title(),
                        note.path(),
                        content.trim_end()
                    )
                })
                .collect();
            for (note, _) in &notes {
                if !included_files.iter().any(|p| p == note.path()) {
                    included_files.push(note.path().to_string());
                }
            }
            blocks.push(format!(
                "<variable name=\"{body}\">\n{}\n</variable>",
                sections.join("\n\n")
            ));
        }

        if blocks.is_empty() {
            return Ok(TemplateOutput {
                text: text.to_string(),
                included_files,
            });
        }

        Ok(TemplateOutput {
            text: format!("{text}\n\n{}", blocks.join("\n\n")),
            included_files,
        })
    }
}

/// Whether `content` carries `needle` (`#tag`) as a whole tag.
fn mentions_tag(content: &str, needle: &str) -> bool {
    content.match_indices(needle).any(|(idx, _)| {
        let before_ok = content[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| c.is_whitespace() || c == '(' || c == ',');
        let after_ok = content[idx + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '/'));
        before_ok && after_ok
    })
}
