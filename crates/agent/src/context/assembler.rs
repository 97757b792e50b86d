//! Per-message context enrichment.
//!
//! Turns the references attached to a user turn into tagged blocks appended
//! to its text:
//!
//! | Source | Block | Fetched through |
//! |--------|-------|-----------------|
//! | markdown note | `<note_context>` | `FileStore` |
//! | other file | `<note_context>` | `DocumentParser` |
//! | URL (not in chat) | `<url_content>` | `DocumentParser` |
//! | selection | `<selected_text>` | carried inline |
//!
//! All references are fetched concurrently and merged back in the order they
//! were attached. Failures never abort processing; they are recorded in the
//! message's [`ContextEnvelope`].

use std::sync::Arc;

use futures::future::join_all;
use noteloom_core::enrich::{DocumentParser, Reference};
use noteloom_core::message::{ContextEnvelope, ConversationKind, Message, NoteRef};
use noteloom_core::store::FileStore;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::repository::MessageRepository;

/// What the caller knows about the surrounding turn.
#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    pub kind: ConversationKind,
    /// Whether the active note should be attached automatically
    pub include_active_note: bool,
    pub active_note: Option<NoteRef>,
    /// The composed system prompt this turn will be sent with
    pub base_system_prompt: String,
    /// Files the system prompt already carries
    pub system_prompt_included_files: Vec<String>,
}

impl ContextRequest {
    fn in_system_prompt(&self, note: &NoteRef) -> bool {
        self.system_prompt_included_files
            .iter()
            .any(|p| p == note.path())
    }
}

/// Result of processing one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContext {
    pub processed_content: String,
    pub envelope: ContextEnvelope,
}

/// Enriches user turns with the content of what they reference.
pub struct ContextAssembler {
    files: Arc<dyn FileStore>,
    parser: Arc<dyn DocumentParser>,
}

impl ContextAssembler {
    pub fn new(files: Arc<dyn FileStore>, parser: Arc<dyn DocumentParser>) -> Self {
        Self { files, parser }
    }

    /// Build the model-facing text for `message`.
    pub async fn process_message_context(
        &self,
        message: &Message,
        request: &ContextRequest,
    ) -> ProcessedContext {
        let mut envelope = ContextEnvelope::default();
        let references = self.collect_references(message, request, &mut envelope);

        debug!(
            id = %message.id,
            references = references.len(),
            skipped = envelope.skipped_notes.len(),
            "Processing message context"
        );

        let fetched = join_all(references.iter().map(|r| self.enrich(r))).await;

        let mut blocks = Vec::new();
        for (reference, outcome) in references.into_iter().zip(fetched) {
            match (reference, outcome) {
                (Reference::Note(note), Ok(content)) => {
                    blocks.push(note_block(&note, &content));
                    envelope.included_notes.push(note);
                }
                (Reference::Url(url), Ok(content)) => {
                    blocks.push(format!(
                        "<url_content url=\"{url}\">\n{}\n</url_content>",
                        content.trim_end()
                    ));
                    envelope.included_urls.push(url);
                }
                (reference, Err(reason)) => {
                    warn!(reference = %reference, reason = %reason, "Context enrichment failed");
                    envelope.errors.insert(reference.key().to_string(), reason);
                }
            }
        }

        for selection in &message.context.selected_text {
            blocks.push(format!(
                "<selected_text>\n<title>{}</title>\n<path>{}</path>\n<content>\n{}\n</content>\n</selected_text>",
                selection.note.title(),
                selection.note.path(),
                selection.content
            ));
        }

        let processed_content = if blocks.is_empty() {
            message.raw_text.clone()
        } else {
            format!("{}\n\n{}", message.raw_text, blocks.join("\n\n"))
        };

        ProcessedContext {
            processed_content,
            envelope,
        }
    }

    /// Rerun processing for a stored turn, typically after an edit.
    ///
    /// The repository is only locked to read the turn and to store the
    /// result, never while references are being fetched.
    pub async fn reprocess_message_context(
        &self,
        id: &str,
        repo: &RwLock<MessageRepository>,
        request: &ContextRequest,
    ) -> bool {
        let Some(message) = repo.read().await.get(id).cloned() else {
            return false;
        };
        let processed = self.process_message_context(&message, request).await;
        repo.write().await.update_processed_text(
            id,
            processed.processed_content,
            Some(processed.envelope),
        )
    }

    fn collect_references(
        &self,
        message: &Message,
        request: &ContextRequest,
        envelope: &mut ContextEnvelope,
    ) -> Vec<Reference> {
        let mut notes: Vec<NoteRef> = message.context.notes.clone();
        if request.include_active_note
            && let Some(active) = &request.active_note
            && !notes.contains(active)
        {
            notes.push(active.clone());
        }

        let mut references = Vec::new();
        for note in notes {
            if request.in_system_prompt(&note) {
                envelope.skipped_notes.push(note);
            } else {
                references.push(Reference::Note(note));
            }
        }

        if request.kind.fetches_urls() {
            for url in &message.context.urls {
                if mentions_url(&request.base_system_prompt, url) {
                    debug!(url = %url, "URL already carried by the system prompt");
                    continue;
                }
                references.push(Reference::Url(url.clone()));
            }
        }

        references
    }

    async fn enrich(&self, reference: &Reference) -> Result<String, String> {
        match reference {
            Reference::Note(note) if note.is_markdown() => self
                .files
                .read(note.path())
                .await
                .map_err(|e| e.to_string()),
            _ => self.parser.parse(reference).await,
        }
    }
}

/// Whether `text` carries `url` as a whole link, not as the start of a
/// longer one. Trailing sentence punctuation still ends the link.
fn mentions_url(text: &str, url: &str) -> bool {
    text.match_indices(url).any(|(idx, _)| {
        let mut rest = text[idx + url.len()..].chars();
        match rest.next() {
            None => true,
            Some(c) if c.is_whitespace() || "<>\"'`)]".contains(c) => true,
            Some('.' | ',' | ';' | ':' | '!' | '?') => {
                rest.next().is_none_or(char::is_whitespace)
            }
            Some(_) => false,
        }
    })
}

fn note_block(note: &NoteRef, content: &str) -> String {
    format!(
        "<note_context>\n<title>{}</title>\n<path>{}</path>\n<content>\n{}\n</content>\n</note_context>",
        note.title(),
        note.path(),
        content.trim_end()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use noteloom_core::enrich::NoopParser;
    use noteloom_core::message::{MessageContext, Sender};
    use noteloom_store::InMemoryFileStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Converts every reference to a fixed text after a delay that shrinks
    /// with position, so completion order is the reverse of request order.
    struct SlowParser {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentParser for SlowParser {
        async fn parse(&self, reference: &Reference) -> Result<String, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50 - 10 * n as u64)).await;
            match reference {
                Reference::Url(url) if url.contains("broken") => Err("HTTP 500".into()),
                other => Ok(format!("converted {other}")),
            }
        }
    }

    async fn vault() -> Arc<InMemoryFileStore> {
        let files = Arc::new(InMemoryFileStore::new());
        files
            .seed([
                ("notes/alpha.md", "Alpha body\n"),
                ("notes/beta.md", "Beta body"),
            ])
            .await;
        files
    }

    #[tokio::test]
    async fn no_references_leaves_text_untouched() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let message = Message::user("Hello");

        let processed = assembler
            .process_message_context(&message, &ContextRequest::default())
            .await;

        assert_eq!(processed.processed_content, "Hello");
        assert_eq!(processed.envelope, ContextEnvelope::default());
    }

    #[tokio::test]
    async fn notes_are_inlined_and_missing_ones_reported() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let context = MessageContext::default()
            .with_note(NoteRef::new("notes/alpha.md"))
            .with_note(NoteRef::new("notes/gone.md"));
        let message = Message::new("Summarize", "Summarize", Sender::User, context);

        let processed = assembler
            .process_message_context(&message, &ContextRequest::default())
            .await;

        assert!(processed.processed_content.starts_with("Summarize\n\n<note_context>"));
        assert!(processed.processed_content.contains("<title>alpha</title>"));
        assert!(processed.processed_content.contains("Alpha body\n</content>"));
        assert_eq!(processed.envelope.included_notes, vec![NoteRef::new("notes/alpha.md")]);
        assert!(processed.envelope.errors.contains_key("notes/gone.md"));
    }

    #[tokio::test]
    async fn notes_in_system_prompt_are_skipped() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let message = Message::new(
            "Go",
            "Go",
            Sender::User,
            MessageContext::default().with_note(NoteRef::new("notes/beta.md")),
        );
        let request = ContextRequest {
            include_active_note: true,
            active_note: Some(NoteRef::new("notes/alpha.md")),
            system_prompt_included_files: vec!["notes/alpha.md".into()],
            ..Default::default()
        };

        let processed = assembler.process_message_context(&message, &request).await;

        assert_eq!(processed.envelope.skipped_notes, vec![NoteRef::new("notes/alpha.md")]);
        assert_eq!(processed.envelope.included_notes, vec![NoteRef::new("notes/beta.md")]);
        assert!(!processed.processed_content.contains("Alpha body"));
    }

    #[tokio::test]
    async fn active_note_only_when_requested() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let message = Message::user("Go");
        let mut request = ContextRequest {
            active_note: Some(NoteRef::new("notes/alpha.md")),
            ..Default::default()
        };

        let off = assembler.process_message_context(&message, &request).await;
        assert_eq!(off.processed_content, "Go");

        request.include_active_note = true;
        let on = assembler.process_message_context(&message, &request).await;
        assert!(on.processed_content.contains("Alpha body"));
    }

    #[tokio::test(start_paused = true)]
    async fn enrichment_order_follows_attachment_order() {
        let parser = Arc::new(SlowParser {
            calls: AtomicUsize::new(0),
        });
        let assembler = ContextAssembler::new(vault().await, parser.clone());
        let context = MessageContext::default()
            .with_note(NoteRef::new("files/report.pdf"))
            .with_url("https://one.example")
            .with_url("https://broken.example")
            .with_url("https://three.example");
        let message = Message::new("Read these", "Read these", Sender::User, context);
        let request = ContextRequest {
            kind: ConversationKind::Agent,
            ..Default::default()
        };

        let processed = assembler.process_message_context(&message, &request).await;

        assert_eq!(parser.calls.load(Ordering::SeqCst), 4);
        let text = &processed.processed_content;
        let pdf = text.find("converted files/report.pdf").unwrap();
        let one = text.find("https://one.example\">").unwrap();
        let three = text.find("https://three.example\">").unwrap();
        assert!(pdf < one && one < three);
        assert_eq!(
            processed.envelope.included_urls,
            vec!["https://one.example".to_string(), "https://three.example".to_string()]
        );
        assert_eq!(
            processed.envelope.errors.get("https://broken.example").map(String::as_str),
            Some("HTTP 500")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn urls_in_system_prompt_skip_only_exact_links() {
        let parser = Arc::new(SlowParser {
            calls: AtomicUsize::new(0),
        });
        let assembler = ContextAssembler::new(vault().await, parser.clone());
        let context = MessageContext::default()
            .with_url("https://a.example")
            .with_url("https://b.example/docs");
        let message = Message::new("Compare", "Compare", Sender::User, context);
        let request = ContextRequest {
            kind: ConversationKind::Agent,
            base_system_prompt: "Prefer https://a.example/page and https://b.example/docs.".into(),
            ..Default::default()
        };

        let processed = assembler.process_message_context(&message, &request).await;

        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            processed.envelope.included_urls,
            vec!["https://a.example".to_string()]
        );
    }

    #[test]
    fn url_mentions_need_a_link_boundary() {
        assert!(mentions_url("see https://a.example", "https://a.example"));
        assert!(mentions_url("(https://a.example) next", "https://a.example"));
        assert!(mentions_url("at https://a.example. Then", "https://a.example"));
        assert!(!mentions_url("https://a.example/page", "https://a.example"));
        assert!(!mentions_url("https://a.example.org", "https://a.example"));
        assert!(!mentions_url("https://a.example?q=1", "https://a.example"));
    }

    #[tokio::test]
    async fn chat_conversations_do_not_fetch_urls() {
        let parser = Arc::new(SlowParser {
            calls: AtomicUsize::new(0),
        });
        let assembler = ContextAssembler::new(vault().await, parser.clone());
        let message = Message::new(
            "See https://one.example",
            "",
            Sender::User,
            MessageContext::default().with_url("https://one.example"),
        );

        let processed = assembler
            .process_message_context(&message, &ContextRequest::default())
            .await;

        assert_eq!(parser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(processed.processed_content, "See https://one.example");
    }

    #[tokio::test]
    async fn selected_text_is_carried_inline() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let mut context = MessageContext::default();
        context.add_selected_text(NoteRef::new("notes/beta.md"), "just this line");
        let message = Message::new("Explain", "Explain", Sender::User, context);

        let processed = assembler
            .process_message_context(&message, &ContextRequest::default())
            .await;

        assert!(processed.processed_content.contains("<selected_text>"));
        assert!(processed.processed_content.contains("just this line"));
        assert!(processed.envelope.included_notes.is_empty());
    }

    #[tokio::test]
    async fn reprocess_updates_the_stored_turn() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let repo = RwLock::new(MessageRepository::new());
        let id = repo
            .write()
            .await
            .add_message(
                "first",
                "first",
                Sender::User,
                MessageContext::default().with_note(NoteRef::new("notes/beta.md")),
                None,
            )
            .unwrap();
        repo.write().await.edit_message(&id, "second");

        assert!(
            assembler
                .reprocess_message_context(&id, &repo, &ContextRequest::default())
                .await
        );
        let repo = repo.read().await;
        let message = repo.get(&id).unwrap();
        assert!(message.processed_text.starts_with("second\n\n<note_context>"));
        assert!(message.envelope.is_some());
    }

    #[tokio::test]
    async fn reprocess_unknown_id_is_false() {
        let assembler = ContextAssembler::new(vault().await, Arc::new(NoopParser));
        let repo = RwLock::new(MessageRepository::new());
        assert!(
            !assembler
                .reprocess_message_context("missing", &repo, &ContextRequest::default())
                .await
        );
    }
}
