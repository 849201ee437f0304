//! Session accumulator
//!
//! One open [`SessionWindow`] exists per account while it is reviewing. The
//! window collects records in fetch order, tracks the newest activity
//! timestamp seen (fetch order is expected but not guaranteed to be
//! chronological), and maintains the smoothed seconds-per-review estimate
//! the closure heuristics run on.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::types::{AccountId, ReviewRecord, SessionSummary};

#[derive(Debug)]
pub struct SessionWindow {
    started_at: DateTime<Utc>,
    records: Vec<Arc<ReviewRecord>>,
    /// Max record timestamp seen so far.
    latest_activity: Option<DateTime<Utc>>,
    /// Monotonic clock restarted whenever `latest_activity` advances; the
    /// silence the closure heuristics measure.
    idle_since: Instant,
    /// Whether the most recent record (by timestamp) is a failed audit.
    audit_failing: bool,
    avg_secs_per_review: f64,
}

impl SessionWindow {
    /// Open a window. `started_at` is already back-dated by the safety
    /// margin; `avg_secs_per_review` carries over from previous sessions.
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, avg_secs_per_review: f64) -> Self {
        Self {
            started_at,
            records: Vec::new(),
            latest_activity: None,
            idle_since: Instant::now(),
            audit_failing: false,
            avg_secs_per_review,
        }
    }

    /// Append a record fetched for this session. `acted_at` is the tracked
    /// account's action timestamp on the record.
    pub fn append(&mut self, record: Arc<ReviewRecord>, acted_at: DateTime<Utc>) {
        if self.latest_activity.is_none_or(|latest| acted_at >= latest) {
            self.latest_activity = Some(acted_at);
            self.idle_since = Instant::now();
            self.audit_failing = record.is_failed_audit();
        }
        self.records.push(record);
    }

    /// Re-estimate reviewing speed from the window so far: once at least
    /// three records exist, blend `window_duration / record_count` 50/50
    /// with the previous estimate. The smoothing damps outliers from
    /// session to session.
    pub fn observe_speed(&mut self) {
        if self.records.len() < 3 {
            return;
        }
        let Some(latest) = self.latest_activity else {
            return;
        };

        let duration_secs = (latest - self.started_at).num_milliseconds() as f64 / 1000.0;
        if duration_secs <= 0.0 {
            return;
        }

        let session_avg = duration_secs / self.records.len() as f64;
        self.avg_secs_per_review = (self.avg_secs_per_review + session_avg) / 2.0;
    }

    /// Silence since the newest observed activity (or since the session
    /// opened, if nothing was fetched yet).
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.idle_since.elapsed()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn latest_activity(&self) -> Option<DateTime<Utc>> {
        self.latest_activity
    }

    #[must_use]
    pub fn audit_failing(&self) -> bool {
        self.audit_failing
    }

    #[must_use]
    pub fn avg_secs_per_review(&self) -> f64 {
        self.avg_secs_per_review
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Close the window into the summary carried by `ReviewingCompleted`.
    #[must_use]
    pub fn into_summary(self, account_id: AccountId, finished_at: DateTime<Utc>) -> SessionSummary {
        SessionSummary {
            account_id,
            started_at: self.started_at,
            finished_at,
            records: self.records,
            latest_activity: self.latest_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, ReviewAction, ReviewResult};
    use chrono::Duration as ChronoDuration;

    fn record(id: u64, actor: AccountId, at: DateTime<Utc>, audit: Option<bool>) -> Arc<ReviewRecord> {
        Arc::new(ReviewRecord {
            id: ItemId(id),
            results: vec![ReviewResult {
                actor,
                action: ReviewAction::Close,
                timestamp: at,
            }],
            audit_passed: audit,
            tags: vec![],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn latest_activity_uses_max_timestamp() {
        let account = AccountId(1);
        let start = Utc::now();
        let mut window = SessionWindow::new(start, 60.0);

        let late = start + ChronoDuration::seconds(120);
        let early = start + ChronoDuration::seconds(30);

        window.append(record(1, account, late, None), late);
        // Out-of-order arrival must not move the cursor backwards.
        window.append(record(2, account, early, Some(false)), early);

        assert_eq!(window.latest_activity(), Some(late));
        assert!(!window.audit_failing());
        assert_eq!(window.record_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn audit_failing_follows_newest_record() {
        let account = AccountId(1);
        let start = Utc::now();
        let mut window = SessionWindow::new(start, 60.0);

        let t1 = start + ChronoDuration::seconds(10);
        let t2 = start + ChronoDuration::seconds(20);
        window.append(record(1, account, t1, None), t1);
        window.append(record(2, account, t2, Some(false)), t2);
        assert!(window.audit_failing());

        let t3 = start + ChronoDuration::seconds(30);
        window.append(record(3, account, t3, None), t3);
        assert!(!window.audit_failing());
    }

    #[tokio::test(start_paused = true)]
    async fn speed_blends_once_three_records_exist() {
        let account = AccountId(1);
        let start = Utc::now();
        let mut window = SessionWindow::new(start, 60.0);

        let t1 = start + ChronoDuration::seconds(30);
        window.append(record(1, account, t1, None), t1);
        window.observe_speed();
        assert_eq!(window.avg_secs_per_review(), 60.0);

        let t2 = start + ChronoDuration::seconds(60);
        let t3 = start + ChronoDuration::seconds(90);
        window.append(record(2, account, t2, None), t2);
        window.append(record(3, account, t3, None), t3);
        window.observe_speed();

        // Session average is 90s / 3 = 30s; blended with 60s gives 45s.
        assert!((window.avg_secs_per_review() - 45.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_resets_on_new_activity() {
        let account = AccountId(1);
        let start = Utc::now();
        let mut window = SessionWindow::new(start, 60.0);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(window.silence() >= Duration::from_secs(30));

        let t = start + ChronoDuration::seconds(30);
        window.append(record(1, account, t, None), t);
        assert!(window.silence() < Duration::from_secs(1));
    }
}
