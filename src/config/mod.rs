//! Watcher configuration
//!
//! This module provides [`WatcherConfig`] and its fluent builder. Every option
//! has a sensible default; `build()` validates the combination and fails fast
//! with a [`ConfigurationError`] instead of letting a pathological throttle
//! ceiling reach the scheduler.

pub mod builder;
pub mod types;

pub use builder::{ConfigurationError, WatcherConfigBuilder};
pub use types::WatcherConfig;
