//! Error types for event bus operations

use super::types::EventTopic;

/// Misuse of the subscription registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    /// A handler with this key is already subscribed to the topic.
    #[error("handler {key:?} is already subscribed to {topic:?}")]
    DuplicateHandler { topic: EventTopic, key: String },

    /// No handler with this key is subscribed to the topic.
    #[error("no handler {key:?} subscribed to {topic:?}")]
    HandlerNotFound { topic: EventTopic, key: String },
}
