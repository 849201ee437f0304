mod common;

use chrono::Utc;
use review_watch::events::{EventBus, EventBusError, EventTopic, ReviewEvent};
use review_watch::types::{AccountId, ItemId, QueueId, ReviewAction, ReviewRecord, ReviewResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn new_bus() -> EventBus {
    common::init_tracing();
    EventBus::new()
}

fn push_event(account: u64) -> ReviewEvent {
    ReviewEvent::UserEnteredQueue {
        queue: QueueId(2),
        account_id: AccountId(account),
        arrived_at: Utc::now(),
    }
}

fn item_reviewed(account: u64) -> ReviewEvent {
    ReviewEvent::ItemReviewed {
        account_id: AccountId(account),
        record: Arc::new(ReviewRecord {
            id: ItemId(1),
            results: vec![ReviewResult {
                actor: AccountId(account),
                action: ReviewAction::Close,
                timestamp: Utc::now(),
            }],
            audit_passed: None,
            tags: vec!["rust".to_string()],
        }),
    }
}

fn probe(bus: &EventBus, topic: EventTopic, key: &str) -> mpsc::UnboundedReceiver<ReviewEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    bus.subscribe(topic, key, move |event| {
        let tx = tx.clone();
        async move {
            tx.send(event)
                .map_err(|_| anyhow::anyhow!("probe receiver dropped"))
        }
    })
    .expect("probe subscription failed");
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ReviewEvent>) -> ReviewEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("probe channel closed")
}

#[tokio::test]
async fn test_publish_with_no_subscribers_is_noop() {
    let bus = new_bus();
    assert_eq!(bus.subscriber_count(EventTopic::UserEnteredQueue), 0);
    assert_eq!(bus.publish(push_event(1)), 0);
}

#[tokio::test]
async fn test_duplicate_key_is_rejected() {
    let bus = new_bus();
    bus.subscribe(EventTopic::ItemReviewed, "observer", |_| async { Ok(()) })
        .expect("first subscription should succeed");

    let err = bus
        .subscribe(EventTopic::ItemReviewed, "observer", |_| async { Ok(()) })
        .expect_err("second subscription under the same key must fail");
    assert!(matches!(err, EventBusError::DuplicateHandler { .. }));

    // Same key on a different topic is fine.
    bus.subscribe(EventTopic::AuditFailed, "observer", |_| async { Ok(()) })
        .expect("same key on another topic should succeed");
}

#[tokio::test]
async fn test_unsubscribe_contract() {
    let bus = new_bus();
    bus.subscribe(EventTopic::ItemReviewed, "observer", |_| async { Ok(()) })
        .expect("subscribe failed");
    assert_eq!(bus.subscriber_count(EventTopic::ItemReviewed), 1);

    bus.unsubscribe(EventTopic::ItemReviewed, "observer")
        .expect("unsubscribe should succeed");
    assert_eq!(bus.subscriber_count(EventTopic::ItemReviewed), 0);

    let err = bus
        .unsubscribe(EventTopic::ItemReviewed, "observer")
        .expect_err("double unsubscribe must fail");
    assert!(matches!(err, EventBusError::HandlerNotFound { .. }));

    let err = bus
        .unsubscribe(EventTopic::ReviewingStarted, "never-registered")
        .expect_err("unknown topic must fail");
    assert!(matches!(err, EventBusError::HandlerNotFound { .. }));
}

#[tokio::test]
async fn test_publish_reaches_all_subscribers() {
    let bus = new_bus();
    let mut first = probe(&bus, EventTopic::UserEnteredQueue, "first");
    let mut second = probe(&bus, EventTopic::UserEnteredQueue, "second");

    let dispatched = bus.publish(push_event(42));
    assert_eq!(dispatched, 2);

    for rx in [&mut first, &mut second] {
        let event = next_event(rx).await;
        assert_eq!(event.account_id(), Some(AccountId(42)));
        assert_eq!(event.topic(), EventTopic::UserEnteredQueue);
    }
}

#[tokio::test]
async fn test_failing_handler_surfaces_internal_exception() {
    let bus = new_bus();
    let mut exceptions = probe(&bus, EventTopic::InternalException, "exceptions");

    bus.subscribe(EventTopic::ItemReviewed, "broken", |_| async {
        Err(anyhow::anyhow!("handler exploded"))
    })
    .expect("subscribe failed");

    bus.publish(item_reviewed(7));

    let event = next_event(&mut exceptions).await;
    let ReviewEvent::InternalException {
        account_id,
        message,
    } = event
    else {
        panic!("expected InternalException, got {event:?}");
    };
    assert_eq!(account_id, Some(AccountId(7)));
    assert!(
        message.contains("broken") && message.contains("handler exploded"),
        "unexpected message: {message}"
    );

    // The failure is reported exactly once.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        exceptions.try_recv().is_err(),
        "a single handler failure must yield a single InternalException"
    );
}

#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let bus = new_bus();
    let mut exceptions = probe(&bus, EventTopic::InternalException, "exceptions");

    bus.subscribe(EventTopic::ItemReviewed, "panicky", |_| async {
        panic!("boom")
    })
    .expect("subscribe failed");
    let mut healthy = probe(&bus, EventTopic::ItemReviewed, "healthy");

    bus.publish(item_reviewed(9));

    // The healthy subscriber still gets the event.
    let event = next_event(&mut healthy).await;
    assert_eq!(event.topic(), EventTopic::ItemReviewed);

    // The panic is reported rather than propagated.
    let event = next_event(&mut exceptions).await;
    assert!(matches!(event, ReviewEvent::InternalException { .. }));
}

#[tokio::test]
async fn test_failing_exception_handler_does_not_recurse() {
    let bus = new_bus();
    bus.subscribe(EventTopic::InternalException, "broken", |_| async {
        Err(anyhow::anyhow!("even the error handler fails"))
    })
    .expect("subscribe failed");

    // Must not loop forever re-publishing InternalException.
    bus.publish(ReviewEvent::internal_exception(None, "original failure"));
    tokio::time::sleep(Duration::from_millis(200)).await;
}
