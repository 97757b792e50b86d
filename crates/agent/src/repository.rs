//! In-memory conversation state.
//!
//! [`MessageRepository`] is the single source of truth for one conversation's
//! turns. It only touches memory; persistence and context processing belong
//! to the caller.

use std::collections::HashSet;

use noteloom_core::error::{Error, Result};
use noteloom_core::message::{ContextEnvelope, Message, MessageContext, Sender};
use noteloom_core::provider::ChatMessage;
use tracing::{debug, warn};

/// Ordered turns of one conversation. Ids are unique.
#[derive(Debug, Default, Clone)]
pub struct MessageRepository {
    messages: Vec<Message>,
}

impl MessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with previously saved turns.
    ///
    /// Turns whose id was already seen are dropped.
    pub fn load(&mut self, messages: Vec<Message>) {
        let mut seen = HashSet::new();
        self.messages = messages
            .into_iter()
            .filter(|m| {
                let fresh = seen.insert(m.id.clone());
                if !fresh {
                    warn!(id = %m.id, "Dropping duplicate message id on load");
                }
                fresh
            })
            .collect();
    }

    /// Append a turn and return its id.
    pub fn add_message(
        &mut self,
        raw_text: impl Into<String>,
        processed_text: impl Into<String>,
        sender: Sender,
        context: MessageContext,
        parent_id: Option<String>,
    ) -> Result<String> {
        let raw_text = raw_text.into();
        if sender == Sender::User && raw_text.trim().is_empty() {
            return Err(Error::Validation("user message text is empty".into()));
        }
        let mut message = Message::new(raw_text, processed_text, sender, context);
        message.parent_id = parent_id;
        let id = message.id.clone();
        debug!(id = %id, ?sender, "Message added");
        self.messages.push(message);
        Ok(id)
    }

    /// Append a turn the model never sees, such as a failure notice.
    pub fn add_display_only(&mut self, text: impl Into<String>, sender: Sender) -> String {
        let text = text.into();
        let mut message = Message::new(text.clone(), text, sender, MessageContext::default());
        message.is_visible = false;
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    pub fn update_processed_text(
        &mut self,
        id: &str,
        processed_text: impl Into<String>,
        envelope: Option<ContextEnvelope>,
    ) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.processed_text = processed_text.into();
                message.envelope = envelope;
                true
            }
            None => false,
        }
    }

    /// Replace the raw text. The processed text stays stale until the caller
    /// reprocesses the turn.
    pub fn edit_message(&mut self, id: &str, new_raw: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.raw_text = new_raw.into();
                true
            }
            None => false,
        }
    }

    /// Swap the references attached to a turn.
    pub fn replace_context(&mut self, id: &str, context: MessageContext) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.context = context;
                true
            }
            None => false,
        }
    }

    /// Remove every turn after the one with `id`. False if `id` is unknown.
    pub fn truncate_after_message_id(&mut self, id: &str) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.truncate_after(index);
                true
            }
            None => false,
        }
    }

    /// Remove every turn after position `index`.
    pub fn truncate_after(&mut self, index: usize) {
        let keep = index.saturating_add(1);
        if keep < self.messages.len() {
            debug!(removed = self.messages.len() - keep, "Truncating conversation");
            self.messages.truncate(keep);
        }
    }

    pub fn delete_message(&mut self, id: &str) -> bool {
        match self.index_of(id) {
            Some(index) => {
                self.messages.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Every turn, in order, as shown to the user.
    pub fn display_messages(&self) -> &[Message] {
        &self.messages
    }

    /// The turns the model sees, carrying their processed text.
    pub fn llm_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.is_visible)
            .map(|m| match m.sender {
                Sender::User => ChatMessage::user(m.processed_text.clone()),
                Sender::Assistant => ChatMessage::assistant(m.processed_text.clone()),
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// The closest visible user turn strictly before `id`.
    pub fn previous_user_message(&self, id: &str) -> Option<&Message> {
        let index = self.index_of(id)?;
        self.messages[..index]
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User && m.is_visible)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noteloom_core::message::NoteRef;
    use noteloom_core::provider::ChatRole;

    fn conversation(turns: usize) -> (MessageRepository, Vec<String>) {
        let mut repo = MessageRepository::new();
        let mut ids = Vec::new();
        for i in 0..turns {
            let sender = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
            let text = format!("turn {i}");
            ids.push(
                repo.add_message(&text, &text, sender, MessageContext::default(), None)
                    .unwrap(),
            );
        }
        (repo, ids)
    }

    #[test]
    fn blank_user_turn_is_rejected() {
        let mut repo = MessageRepository::new();
        let err = repo
            .add_message("  \n", "", Sender::User, MessageContext::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.is_empty());

        // Assistant turns may legitimately be empty
        repo.add_message("", "", Sender::Assistant, MessageContext::default(), None)
            .unwrap();
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let (_, ids) = conversation(20);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn truncation_preserves_prefix_at_every_position() {
        for n in 1..8 {
            for k in 0..n {
                let (mut repo, ids) = conversation(n);
                let before: Vec<String> = repo
                    .display_messages()
                    .iter()
                    .map(|m| m.raw_text.clone())
                    .collect();

                assert!(repo.truncate_after_message_id(&ids[k]));

                assert_eq!(repo.len(), k + 1);
                let after: Vec<&str> = repo
                    .display_messages()
                    .iter()
                    .map(|m| m.raw_text.as_str())
                    .collect();
                assert_eq!(after, before[..=k].iter().map(String::as_str).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn truncate_unknown_id_is_a_noop() {
        let (mut repo, _) = conversation(3);
        assert!(!repo.truncate_after_message_id("missing"));
        assert_eq!(repo.len(), 3);
        repo.truncate_after(10);
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn edit_keeps_id_and_leaves_processed_text_stale() {
        let (mut repo, ids) = conversation(2);
        assert!(repo.edit_message(&ids[0], "rewritten"));

        let message = repo.get(&ids[0]).unwrap();
        assert_eq!(message.id, ids[0]);
        assert_eq!(message.raw_text, "rewritten");
        assert_eq!(message.processed_text, "turn 0");
        assert!(!repo.edit_message("missing", "x"));
    }

    #[test]
    fn update_processed_text_attaches_envelope() {
        let (mut repo, ids) = conversation(1);
        let envelope = ContextEnvelope {
            included_notes: vec![NoteRef::new("a.md")],
            ..Default::default()
        };
        assert!(repo.update_processed_text(&ids[0], "turn 0 + context", Some(envelope.clone())));
        let message = repo.get(&ids[0]).unwrap();
        assert_eq!(message.processed_text, "turn 0 + context");
        assert_eq!(message.envelope.as_ref(), Some(&envelope));
        assert!(!repo.update_processed_text("missing", "x", None));
    }

    #[test]
    fn llm_projection_skips_display_only_turns() {
        let mut repo = MessageRepository::new();
        let id = repo
            .add_message("hi", "hi <note_context/>", Sender::User, MessageContext::default(), None)
            .unwrap();
        repo.add_display_only("Rate limit reached", Sender::Assistant);
        repo.add_message("hello", "hello", Sender::Assistant, MessageContext::default(), Some(id))
            .unwrap();

        assert_eq!(repo.display_messages().len(), 3);
        let llm = repo.llm_messages();
        assert_eq!(llm.len(), 2);
        assert_eq!(llm[0].role, ChatRole::User);
        assert_eq!(llm[0].content, "hi <note_context/>");
        assert_eq!(llm[1].role, ChatRole::Assistant);
    }

    #[test]
    fn previous_user_message_skips_assistant_turns() {
        let (repo, ids) = conversation(4);
        assert_eq!(repo.previous_user_message(&ids[3]).unwrap().id, ids[2]);
        assert_eq!(repo.previous_user_message(&ids[1]).unwrap().id, ids[0]);
        assert!(repo.previous_user_message(&ids[0]).is_none());
    }

    #[test]
    fn delete_and_clear() {
        let (mut repo, ids) = conversation(3);
        assert!(repo.delete_message(&ids[1]));
        assert!(!repo.delete_message(&ids[1]));
        assert_eq!(repo.index_of(&ids[2]), Some(1));
        repo.clear();
        assert!(repo.is_empty());
    }

    #[test]
    fn load_drops_duplicate_ids() {
        let first = Message::user("one");
        let mut dup = Message::user("two");
        dup.id = first.id.clone();
        let mut repo = MessageRepository::new();
        repo.load(vec![first.clone(), dup, Message::assistant("three")]);
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.get(&first.id).unwrap().raw_text, "one");
    }
}
