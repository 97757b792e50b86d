//! Document enrichment collaborator.
//!
//! Turns a reference (a non-markdown file such as a PDF or an image, or a
//! URL) into text that can be inlined into a message. Conversion itself
//! happens outside the core; failures are reported as an error string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::NoteRef;

/// Something a message can point at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Reference {
    Note(NoteRef),
    Url(String),
}

impl Reference {
    /// The key used for this reference in error maps and logs.
    pub fn key(&self) -> &str {
        match self {
            Self::Note(note) => note.path(),
            Self::Url(url) => url,
        }
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Converts references into text.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, reference: &Reference) -> std::result::Result<String, String>;
}

/// A parser that converts nothing. Every reference fails with a fixed message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopParser;

#[async_trait]
impl DocumentParser for NoopParser {
    async fn parse(&self, reference: &Reference) -> std::result::Result<String, String> {
        Err(format!("no converter available for {reference}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_parser_always_fails() {
        let err = NoopParser
            .parse(&Reference::Url("https://example.com".into()))
            .await
            .unwrap_err();
        assert!(err.contains("https://example.com"));
    }

    #[test]
    fn reference_key() {
        assert_eq!(Reference::Note(NoteRef::new("a/b.pdf")).key(), "a/b.pdf");
        assert_eq!(Reference::Url("https://x.y".into()).to_string(), "https://x.y");
    }
}
