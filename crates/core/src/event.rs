//! Domain events published while conversations run and prompts change.
//!
//! The orchestrator, tool loop and prompt cache publish onto a shared
//! [`EventBus`]; front ends subscribe to follow progress without holding a
//! reference to the component that did the work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of events a lagging subscriber may fall behind by.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A turn was appended to a conversation
    MessageAdded {
        conversation_id: String,
        message_id: String,
        sender: String,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a final answer
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The prompt cache changed ("upsert", "delete", "rename", "migrate")
    PromptCacheUpdated {
        operation: String,
        title: String,
        timestamp: DateTime<Utc>,
    },

    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short label for logs and filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageAdded { .. } => "message_added",
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::PromptCacheUpdated { .. } => "prompt_cache_updated",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::MessageAdded { timestamp, .. }
            | Self::ResponseGenerated { timestamp, .. }
            | Self::ToolExecuted { timestamp, .. }
            | Self::PromptCacheUpdated { timestamp, .. }
            | Self::ErrorOccurred { timestamp, .. } => *timestamp,
        }
    }
}

/// Multi-consumer fan-out of [`DomainEvent`]s.
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        let delivered = self.sender.send(Arc::new(event)).unwrap_or(0);
        trace!(kind, delivered, "Domain event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_event(title: &str) -> DomainEvent {
        DomainEvent::PromptCacheUpdated {
            operation: "upsert".into(),
            title: title.into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(cache_event("Brief"));
        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "read_note".into(),
            success: true,
            duration_ms: 3,
            timestamp: Utc::now(),
        });

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap().kind(), "prompt_cache_updated");
            assert_eq!(rx.recv().await.unwrap().kind(), "tool_executed");
        }
    }

    #[test]
    fn publishing_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.publish(cache_event("Nobody listens"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_a_type_tag() {
        let json = serde_json::to_value(cache_event("Brief")).unwrap();
        assert_eq!(json["type"], "prompt_cache_updated");
        assert_eq!(json["title"], "Brief");
    }
}
