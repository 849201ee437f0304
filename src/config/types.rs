//! Configuration values for the watcher
//!
//! Constructed through [`WatcherConfig::builder`]; fields are validated at
//! build time and read-only afterwards.

use std::time::Duration;

use crate::types::QueueId;

/// Default global admission budget, requests per minute.
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: f64 = 60.0;
/// Default background-poll divisor/multiplier.
pub const DEFAULT_BACKGROUND_POLL_FACTOR: f64 = 8.0;
/// Default idle-timeout multiplier on the average review duration.
pub const DEFAULT_IDLE_FACTOR: f64 = 4.0;
/// Default audit-failure multiplier on the average review duration.
pub const DEFAULT_AUDIT_FAILURE_FACTOR: f64 = 2.0;
/// Queue backlog above which the daily review limit is 40 instead of 20.
pub const DEFAULT_DAILY_LIMIT_BACKLOG_THRESHOLD: u32 = 1000;
/// Default assumed reviewing speed before any session data exists.
pub const DEFAULT_INITIAL_SECS_PER_REVIEW: f64 = 60.0;

/// Configuration for a [`ReviewWatcher`](crate::registry::ReviewWatcher).
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Global ceiling on remote requests per minute, shared across accounts.
    pub(crate) max_requests_per_minute: f64,

    /// Multiplier applied to background-verification polls; also the fraction
    /// (`1/factor`) a pending-activity account contributes to the observed
    /// request rate.
    pub(crate) background_poll_factor: f64,

    /// Session closes after `avg_secs_per_review * idle_factor` of silence.
    pub(crate) idle_factor: f64,

    /// Session closes after `avg_secs_per_review * audit_failure_factor` of
    /// silence following a failed audit.
    pub(crate) audit_failure_factor: f64,

    /// Queue backlog above which the daily review limit is 40 instead of 20.
    pub(crate) daily_limit_backlog_threshold: u32,

    /// Force a push-feed reconnect if no valid frame decoded for this long.
    pub(crate) stale_feed_threshold: Duration,

    /// How often the staleness watchdog checks the feed.
    pub(crate) watchdog_interval: Duration,

    /// Lower bound on any scheduler-computed polling interval.
    pub(crate) min_poll_interval: Duration,

    /// Session start is back-dated by this margin so the review represented
    /// by the triggering push event itself is captured.
    pub(crate) session_start_margin: Duration,

    /// Assumed seconds-per-review before the first session completes.
    pub(crate) initial_secs_per_review: f64,

    /// WebSocket URL of the push-notification feed.
    pub(crate) dashboard_url: String,

    /// Subscription string sent once on connect.
    pub(crate) dashboard_handshake: String,

    /// The review queue this watcher cares about; push events for other
    /// queues are ignored.
    pub(crate) queue_id: QueueId,

    /// Capacity of each account worker's command channel.
    pub(crate) command_channel_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: DEFAULT_MAX_REQUESTS_PER_MINUTE,
            background_poll_factor: DEFAULT_BACKGROUND_POLL_FACTOR,
            idle_factor: DEFAULT_IDLE_FACTOR,
            audit_failure_factor: DEFAULT_AUDIT_FAILURE_FACTOR,
            daily_limit_backlog_threshold: DEFAULT_DAILY_LIMIT_BACKLOG_THRESHOLD,
            stale_feed_threshold: Duration::from_secs(300),
            watchdog_interval: Duration::from_secs(15),
            min_poll_interval: Duration::from_secs(1),
            session_start_margin: Duration::from_secs(10),
            initial_secs_per_review: DEFAULT_INITIAL_SECS_PER_REVIEW,
            dashboard_url: "ws://qa.sockets.stackexchange.com".to_string(),
            dashboard_handshake: "1-review-dashboard-update".to_string(),
            queue_id: QueueId(2),
            command_channel_capacity: 32,
        }
    }
}

impl WatcherConfig {
    #[must_use]
    pub fn max_requests_per_minute(&self) -> f64 {
        self.max_requests_per_minute
    }

    #[must_use]
    pub fn background_poll_factor(&self) -> f64 {
        self.background_poll_factor
    }

    #[must_use]
    pub fn idle_factor(&self) -> f64 {
        self.idle_factor
    }

    #[must_use]
    pub fn audit_failure_factor(&self) -> f64 {
        self.audit_failure_factor
    }

    #[must_use]
    pub fn daily_limit_backlog_threshold(&self) -> u32 {
        self.daily_limit_backlog_threshold
    }

    #[must_use]
    pub fn stale_feed_threshold(&self) -> Duration {
        self.stale_feed_threshold
    }

    #[must_use]
    pub fn watchdog_interval(&self) -> Duration {
        self.watchdog_interval
    }

    #[must_use]
    pub fn min_poll_interval(&self) -> Duration {
        self.min_poll_interval
    }

    #[must_use]
    pub fn session_start_margin(&self) -> Duration {
        self.session_start_margin
    }

    #[must_use]
    pub fn initial_secs_per_review(&self) -> f64 {
        self.initial_secs_per_review
    }

    #[must_use]
    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    #[must_use]
    pub fn dashboard_handshake(&self) -> &str {
        &self.dashboard_handshake
    }

    #[must_use]
    pub fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    #[must_use]
    pub fn command_channel_capacity(&self) -> usize {
        self.command_channel_capacity
    }

    /// The daily review limit implied by a queue backlog reading.
    #[must_use]
    pub fn daily_limit_for_backlog(&self, backlog: u32) -> u32 {
        if backlog > self.daily_limit_backlog_threshold {
            40
        } else {
            20
        }
    }
}
