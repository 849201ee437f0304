//! Event bus implementation
//!
//! Keyed handler registry per topic. Publishing spawns one task per handler,
//! so dispatches are independent: a handler that errors or panics is caught
//! and reported once as `InternalException` without disturbing the other
//! subscribers. Failures of `InternalException` handlers themselves are
//! dropped to avoid infinite recursion.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use super::errors::EventBusError;
use super::types::{EventTopic, ReviewEvent};

type EventHandler = Arc<dyn Fn(ReviewEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Typed publish/subscribe registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<DashMap<EventTopic, Vec<(String, EventHandler)>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `key` for a topic.
    ///
    /// # Errors
    /// [`EventBusError::DuplicateHandler`] if `key` is already registered
    /// for this topic.
    pub fn subscribe<F, Fut>(
        &self,
        topic: EventTopic,
        key: impl Into<String>,
        handler: F,
    ) -> Result<(), EventBusError>
    where
        F: Fn(ReviewEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let key = key.into();
        let mut entry = self.handlers.entry(topic).or_default();

        if entry.iter().any(|(existing, _)| *existing == key) {
            return Err(EventBusError::DuplicateHandler { topic, key });
        }

        let handler: EventHandler = Arc::new(move |event| Box::pin(handler(event)));
        entry.push((key, handler));
        Ok(())
    }

    /// Remove the handler registered under `key` for a topic.
    ///
    /// # Errors
    /// [`EventBusError::HandlerNotFound`] if no such handler exists.
    pub fn unsubscribe(&self, topic: EventTopic, key: &str) -> Result<(), EventBusError> {
        let mut entry =
            self.handlers
                .get_mut(&topic)
                .ok_or_else(|| EventBusError::HandlerNotFound {
                    topic,
                    key: key.to_string(),
                })?;

        let before = entry.len();
        entry.retain(|(existing, _)| existing != key);
        if entry.len() == before {
            return Err(EventBusError::HandlerNotFound {
                topic,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Number of handlers currently subscribed to a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.handlers.get(&topic).map_or(0, |entry| entry.len())
    }

    /// Dispatch an event to every handler of its topic.
    ///
    /// Each handler runs in its own spawned task. Publishing to a topic with
    /// zero subscribers is a no-op. Returns the number of handlers the event
    /// was dispatched to.
    pub fn publish(&self, event: ReviewEvent) -> usize {
        let topic = event.topic();
        let Some(entry) = self.handlers.get(&topic) else {
            return 0;
        };
        let targets: Vec<(String, EventHandler)> = entry.value().clone();
        drop(entry);

        let account_id = event.account_id();
        for (key, handler) in &targets {
            let bus = self.clone();
            let key = key.clone();
            let handler = Arc::clone(handler);
            let event = event.clone();

            tokio::spawn(async move {
                // Inner spawn isolates handler panics as JoinErrors.
                let outcome = tokio::spawn(handler(event)).await;
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(format!("{err:#}")),
                    Err(join_err) => Some(format!("handler panicked: {join_err}")),
                };

                if let Some(message) = failure {
                    if topic == EventTopic::InternalException {
                        // Recursion guard: a failing exception handler is
                        // logged and dropped.
                        tracing::error!(key, %message, "InternalException handler failed");
                    } else {
                        tracing::warn!(key, ?topic, %message, "event handler failed");
                        bus.publish(ReviewEvent::internal_exception(
                            account_id,
                            format!("{topic:?} handler {key:?} failed: {message}"),
                        ));
                    }
                }
            });
        }

        targets.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.handlers.len())
            .finish()
    }
}
