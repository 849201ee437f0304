//! Typed publish/subscribe event system
//!
//! Producers (the push listener and the session detectors) publish
//! [`ReviewEvent`]s; consumers register keyed handlers per topic. Each
//! dispatch runs in its own task, so a slow or failing subscriber never
//! affects other subscribers or the producer. Handler failures are reported
//! once through the `InternalException` topic.

pub mod bus;
pub mod errors;
pub mod types;

pub use bus::EventBus;
pub use errors::EventBusError;
pub use types::{EventTopic, ReviewEvent};
