//! Fluent builder for [`WatcherConfig`] with build-time validation

use std::time::Duration;

use super::types::WatcherConfig;
use crate::types::QueueId;

/// Invalid watcher configuration, rejected at build time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("max_requests_per_minute must be positive and finite, got {0}")]
    InvalidRequestCeiling(f64),

    #[error("background_poll_factor must be at least 1, got {0}")]
    InvalidBackgroundFactor(f64),

    #[error("{name} must be positive and finite, got {value}")]
    NonPositiveFactor { name: &'static str, value: f64 },

    #[error("{name} must be a non-zero duration")]
    ZeroDuration { name: &'static str },

    #[error("dashboard_url must be a ws:// or wss:// URL, got {0:?}")]
    InvalidDashboardUrl(String),
}

/// Builder for [`WatcherConfig`]. All options default; `build()` validates.
#[derive(Debug, Clone, Default)]
pub struct WatcherConfigBuilder {
    config: WatcherConfig,
}

impl WatcherConfig {
    #[must_use]
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }
}

impl WatcherConfigBuilder {
    /// Global ceiling on remote requests per minute (default 60).
    #[must_use]
    pub fn max_requests_per_minute(mut self, ceiling: f64) -> Self {
        self.config.max_requests_per_minute = ceiling;
        self
    }

    /// Background-poll factor (default 8).
    #[must_use]
    pub fn background_poll_factor(mut self, factor: f64) -> Self {
        self.config.background_poll_factor = factor;
        self
    }

    /// Idle-timeout multiplier (default 4).
    #[must_use]
    pub fn idle_factor(mut self, factor: f64) -> Self {
        self.config.idle_factor = factor;
        self
    }

    /// Audit-failure-timeout multiplier (default 2).
    #[must_use]
    pub fn audit_failure_factor(mut self, factor: f64) -> Self {
        self.config.audit_failure_factor = factor;
        self
    }

    /// Queue backlog threshold for the 40-vs-20 daily limit (default 1000).
    #[must_use]
    pub fn daily_limit_backlog_threshold(mut self, backlog: u32) -> Self {
        self.config.daily_limit_backlog_threshold = backlog;
        self
    }

    /// Staleness threshold for the push feed (default 5 minutes).
    #[must_use]
    pub fn stale_feed_threshold(mut self, threshold: Duration) -> Self {
        self.config.stale_feed_threshold = threshold;
        self
    }

    /// Watchdog check period (default 15 s).
    #[must_use]
    pub fn watchdog_interval(mut self, interval: Duration) -> Self {
        self.config.watchdog_interval = interval;
        self
    }

    /// Lower bound on scheduler-computed intervals (default 1 s).
    #[must_use]
    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.config.min_poll_interval = interval;
        self
    }

    /// Back-dating margin for session starts (default 10 s).
    #[must_use]
    pub fn session_start_margin(mut self, margin: Duration) -> Self {
        self.config.session_start_margin = margin;
        self
    }

    /// Assumed seconds-per-review before any session data (default 60).
    #[must_use]
    pub fn initial_secs_per_review(mut self, secs: f64) -> Self {
        self.config.initial_secs_per_review = secs;
        self
    }

    /// Push-feed WebSocket URL.
    #[must_use]
    pub fn dashboard_url(mut self, url: impl Into<String>) -> Self {
        self.config.dashboard_url = url.into();
        self
    }

    /// Subscription string sent on connect.
    #[must_use]
    pub fn dashboard_handshake(mut self, handshake: impl Into<String>) -> Self {
        self.config.dashboard_handshake = handshake.into();
        self
    }

    /// The review queue to track (default 2, close votes).
    #[must_use]
    pub fn queue_id(mut self, queue: QueueId) -> Self {
        self.config.queue_id = queue;
        self
    }

    /// Capacity of each account worker's command channel (default 32).
    #[must_use]
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.command_channel_capacity = capacity.max(1);
        self
    }

    /// Validate and produce the final configuration.
    pub fn build(self) -> Result<WatcherConfig, ConfigurationError> {
        let c = &self.config;

        if !c.max_requests_per_minute.is_finite() || c.max_requests_per_minute <= 0.0 {
            return Err(ConfigurationError::InvalidRequestCeiling(
                c.max_requests_per_minute,
            ));
        }
        if !c.background_poll_factor.is_finite() || c.background_poll_factor < 1.0 {
            return Err(ConfigurationError::InvalidBackgroundFactor(
                c.background_poll_factor,
            ));
        }
        for (name, value) in [
            ("idle_factor", c.idle_factor),
            ("audit_failure_factor", c.audit_failure_factor),
            ("initial_secs_per_review", c.initial_secs_per_review),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::NonPositiveFactor { name, value });
            }
        }
        for (name, value) in [
            ("stale_feed_threshold", c.stale_feed_threshold),
            ("watchdog_interval", c.watchdog_interval),
            ("min_poll_interval", c.min_poll_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigurationError::ZeroDuration { name });
            }
        }
        if !(c.dashboard_url.starts_with("ws://") || c.dashboard_url.starts_with("wss://")) {
            return Err(ConfigurationError::InvalidDashboardUrl(
                c.dashboard_url.clone(),
            ));
        }

        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = WatcherConfig::builder().build().unwrap();
        assert_eq!(config.max_requests_per_minute(), 60.0);
        assert_eq!(config.background_poll_factor(), 8.0);
        assert_eq!(config.daily_limit_for_backlog(1500), 40);
        assert_eq!(config.daily_limit_for_backlog(1000), 20);
    }

    #[test]
    fn rejects_non_positive_ceiling() {
        let err = WatcherConfig::builder()
            .max_requests_per_minute(0.0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidRequestCeiling(0.0));

        assert!(
            WatcherConfig::builder()
                .max_requests_per_minute(-5.0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn rejects_sub_one_background_factor() {
        let err = WatcherConfig::builder()
            .background_poll_factor(0.5)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidBackgroundFactor(0.5));
    }

    #[test]
    fn rejects_bad_dashboard_url() {
        assert!(
            WatcherConfig::builder()
                .dashboard_url("http://example.com")
                .build()
                .is_err()
        );
        assert!(
            WatcherConfig::builder()
                .dashboard_url("wss://example.com/feed")
                .build()
                .is_ok()
        );
    }

    #[test]
    fn rejects_zero_durations() {
        let err = WatcherConfig::builder()
            .min_poll_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ZeroDuration {
                name: "min_poll_interval"
            }
        );
    }
}
