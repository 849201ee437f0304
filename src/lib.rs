//! Review-session tracking for remote moderation queues
//!
//! The crate watches a review dashboard's push feed, detects when tracked
//! accounts start and stop reviewing, fetches the records they complete and
//! publishes typed events for every observation. All remote traffic is paced
//! by a global admission scheduler so any number of tracked accounts shares
//! one request budget.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use review_watch::config::WatcherConfig;
//! use review_watch::events::EventTopic;
//! use review_watch::registry::ReviewWatcher;
//! use review_watch::types::AccountId;
//!
//! # async fn run(fetcher: Arc<dyn review_watch::fetcher::ReviewFetcher>) -> anyhow::Result<()> {
//! let config = WatcherConfig::builder()
//!     .max_requests_per_minute(60.0)
//!     .build()?;
//!
//! let watcher = ReviewWatcher::new(config, fetcher);
//! watcher.bus().subscribe(EventTopic::ReviewingCompleted, "report", |event| async move {
//!     println!("{event:?}");
//!     Ok(())
//! })?;
//!
//! watcher.register_account(AccountId(1234), false)?;
//! watcher.start()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dashboard;
pub mod dedup;
pub mod events;
pub mod fetcher;
pub mod registry;
pub mod session;
pub mod throttle;
pub mod types;

pub use config::{ConfigurationError, WatcherConfig};
pub use events::{EventBus, EventBusError, EventTopic, ReviewEvent};
pub use fetcher::{FetchError, ReviewFetcher};
pub use registry::{ReviewWatcher, WatcherError};
pub use types::{AccountId, ItemId, PushEvent, QueueId, ReviewRecord, SessionSummary};
