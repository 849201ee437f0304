//! The per-account worker
//!
//! A detector is a state machine with two states. Idle: wait for a push
//! notification on the tracked queue, then open a session back-dated by the
//! configured margin. Reviewing: poll the remote on scheduler-computed
//! intervals, fold fetched records into the open [`SessionWindow`], and close
//! the session when the daily limit is reached, when silence follows a
//! failed audit, or when the idle timeout expires.
//!
//! All remote traffic goes through the shared [`ThrottleState`]: every call
//! is recorded against the global window, and push notifications are turned
//! into pending-count reservations so the scheduler sees activity before the
//! next poll lands.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::dedup::DedupCache;
use crate::events::{EventBus, ReviewEvent};
use crate::fetcher::ReviewFetcher;
use crate::throttle::ThrottleState;
use crate::types::{AccountId, PushEvent};

use super::window::SessionWindow;

/// Dedup capacity for accounts without a daily limit.
const MODERATOR_DEDUP_CAPACITY: usize = 500;

/// Control messages delivered to a running detector.
#[derive(Debug, Clone, Copy)]
pub enum DetectorCommand {
    /// A push notification arrived for this account.
    Push(PushEvent),
    /// UTC midnight passed: close any open session, reset daily counters and
    /// refresh the token.
    DailyReset,
}

/// Why an open session was closed. Logged, not part of the public API.
#[derive(Debug, Clone, Copy)]
enum CloseReason {
    DailyLimit,
    AuditFailure,
    IdleTimeout,
    DailyReset,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::DailyLimit => "daily limit reached",
            Self::AuditFailure => "audit failure timeout",
            Self::IdleTimeout => "idle timeout",
            Self::DailyReset => "daily reset",
        }
    }
}

/// One account's session-tracking worker.
pub struct SessionDetector {
    account_id: AccountId,
    /// Moderators have no daily review limit.
    moderator: bool,
    config: Arc<WatcherConfig>,
    bus: EventBus,
    throttle: Arc<ThrottleState>,
    fetcher: Arc<dyn ReviewFetcher>,
    dedup: DedupCache,
    token: Option<String>,
    /// Today's review limit, fetched lazily; `None` when unknown or when the
    /// account is a moderator.
    daily_limit: Option<u32>,
    /// Reviews completed today, seeded from the remote at session start.
    completed_today: u32,
    /// Carried across sessions; seeds each new window's speed estimate.
    avg_secs_per_review: f64,
}

impl SessionDetector {
    /// Spawn a detector task for one account. Commands arrive on the
    /// returned sender; the task runs until `cancel` fires or the sender is
    /// dropped.
    pub fn spawn(
        account_id: AccountId,
        moderator: bool,
        config: Arc<WatcherConfig>,
        bus: EventBus,
        throttle: Arc<ThrottleState>,
        fetcher: Arc<dyn ReviewFetcher>,
        cancel: CancellationToken,
    ) -> (mpsc::Sender<DetectorCommand>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_channel_capacity());
        let detector = Self {
            account_id,
            moderator,
            dedup: DedupCache::new(MODERATOR_DEDUP_CAPACITY),
            token: None,
            daily_limit: None,
            completed_today: 0,
            avg_secs_per_review: config.initial_secs_per_review(),
            config,
            bus,
            throttle,
            fetcher,
        };
        let handle = tokio::spawn(detector.run(rx, cancel));
        (tx, handle)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<DetectorCommand>, cancel: CancellationToken) {
        let mut window: Option<SessionWindow> = None;

        loop {
            if window.is_some() {
                let background = self.throttle.pending_count(self.account_id) == 0;
                let interval = self.throttle.next_interval(self.account_id, background);

                tokio::select! {
                    _ = cancel.cancelled() => break,

                    command = commands.recv() => match command {
                        None => break,
                        Some(DetectorCommand::Push(event)) => {
                            if event.queue == self.config.queue_id() {
                                self.throttle.note_push(self.account_id);
                            }
                        }
                        Some(DetectorCommand::DailyReset) => {
                            self.daily_reset(&mut window).await;
                        }
                    },

                    _ = tokio::time::sleep(interval) => {
                        if let Some(active) = window.as_mut() {
                            self.poll_tick(active).await;
                        }
                        let due = window.as_ref().and_then(|active| self.close_due(active));
                        if let (Some(reason), Some(closed)) = (due, window.take()) {
                            self.close_session(closed, reason);
                        }
                    }
                }
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    command = commands.recv() => match command {
                        None => break,
                        Some(DetectorCommand::Push(event)) => {
                            if event.queue == self.config.queue_id() {
                                self.throttle.note_push(self.account_id);
                                window = Some(self.start_session(event.arrived_at).await);
                            }
                        }
                        Some(DetectorCommand::DailyReset) => {
                            self.daily_reset(&mut window).await;
                        }
                    },
                }
            }
        }

        tracing::debug!(account = %self.account_id, "session detector stopped");
    }

    /// Open a new session triggered by a push notification.
    async fn start_session(&mut self, arrived_at: DateTime<Utc>) -> SessionWindow {
        let margin = chrono::Duration::from_std(self.config.session_start_margin())
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        let started_at = arrived_at - margin;

        tracing::info!(account = %self.account_id, %started_at, "reviewing session started");
        self.bus.publish(ReviewEvent::ReviewingStarted {
            account_id: self.account_id,
            started_at,
        });

        // Seed the completed-today counter so the daily-limit check can add
        // session records to it.
        if let Some(token) = self.ensure_token().await {
            self.throttle.record_request();
            match self
                .fetcher
                .completed_count(&token, self.account_id)
                .await
            {
                Ok(count) => self.completed_today = count,
                Err(err) => self.report(&err),
            }
        }
        self.ensure_daily_limit().await;

        SessionWindow::new(started_at, self.avg_secs_per_review)
    }

    /// One polling cycle: fetch the newest ids (one more than the pending
    /// push count), resolve unseen ones and fold them into the window.
    async fn poll_tick(&mut self, window: &mut SessionWindow) {
        let Some(token) = self.ensure_token().await else {
            return;
        };

        let pending = self.throttle.take_pending(self.account_id);
        let fetch_count = pending as usize + 1;

        self.throttle.record_request();
        let ids = match self
            .fetcher
            .latest_review_ids(&token, self.account_id, fetch_count)
            .await
        {
            Ok(ids) => ids,
            Err(err) => {
                self.report(&err);
                return;
            }
        };

        let today = Utc::now().date_naive();
        for item in ids {
            if self.dedup.contains(item) {
                continue;
            }

            self.throttle.record_request();
            let record = match self.fetcher.review_record(&token, item).await {
                Ok(record) => Arc::new(record),
                Err(err) => {
                    self.report(&err);
                    continue;
                }
            };

            let Some(acted_at) = record.timestamp_for(self.account_id) else {
                // The listing page can momentarily show items the account has
                // not actually acted on.
                tracing::trace!(account = %self.account_id, %item, "record without own result, skipping");
                continue;
            };

            // Stale listing entries: yesterday's reviews and anything before
            // the session opened do not belong to this session.
            if acted_at.date_naive() != today || acted_at < window.started_at() {
                self.dedup.insert(item);
                continue;
            }

            self.dedup.insert(item);
            window.append(Arc::clone(&record), acted_at);
            self.completed_today = self.completed_today.saturating_add(1);

            if let Some(outcome) = ReviewEvent::audit_outcome(self.account_id, &record) {
                self.bus.publish(outcome);
            }
            self.bus.publish(ReviewEvent::ItemReviewed {
                account_id: self.account_id,
                record,
            });
        }

        window.observe_speed();
        self.avg_secs_per_review = window.avg_secs_per_review();
    }

    /// Closure checks, in priority order: daily limit, audit-failure
    /// timeout, idle timeout.
    fn close_due(&self, window: &SessionWindow) -> Option<CloseReason> {
        if let Some(limit) = self.daily_limit {
            if self.completed_today >= limit {
                return Some(CloseReason::DailyLimit);
            }
        }

        let silence = window.silence().as_secs_f64();
        let avg = window.avg_secs_per_review();

        if window.audit_failing() && silence > avg * self.config.audit_failure_factor() {
            return Some(CloseReason::AuditFailure);
        }
        if silence > avg * self.config.idle_factor() {
            return Some(CloseReason::IdleTimeout);
        }
        None
    }

    fn close_session(&mut self, window: SessionWindow, reason: CloseReason) {
        let finished_at = Utc::now();
        self.avg_secs_per_review = window.avg_secs_per_review();

        tracing::info!(
            account = %self.account_id,
            reason = reason.as_str(),
            records = window.record_count(),
            "reviewing session closed"
        );

        let session = window.into_summary(self.account_id, finished_at);
        self.bus.publish(ReviewEvent::ReviewingCompleted {
            account_id: self.account_id,
            session,
        });
    }

    /// Midnight rollover: close any open session carrying records, wipe the
    /// per-day state and refresh the token eagerly.
    async fn daily_reset(&mut self, window: &mut Option<SessionWindow>) {
        if let Some(open) = window.take() {
            if !open.is_empty() {
                self.close_session(open, CloseReason::DailyReset);
            }
        }

        self.dedup.clear();
        self.completed_today = 0;
        self.daily_limit = None;
        self.token = None;

        self.throttle.record_request();
        match self.fetcher.refresh_token().await {
            Ok(token) => self.token = Some(token),
            Err(err) => self.report(&err),
        }
    }

    /// The cached session token, fetching one if needed.
    async fn ensure_token(&mut self) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(token.clone());
        }

        self.throttle.record_request();
        match self.fetcher.refresh_token().await {
            Ok(token) => {
                self.token = Some(token.clone());
                Some(token)
            }
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Today's review limit, derived from the queue backlog on first use.
    /// Moderators have none. A backlog fetch failure falls back to the
    /// conservative limit of 20 for the rest of the day.
    async fn ensure_daily_limit(&mut self) -> Option<u32> {
        if self.moderator {
            return None;
        }
        if let Some(limit) = self.daily_limit {
            return Some(limit);
        }

        self.throttle.record_request();
        let limit = match self.fetcher.queue_backlog().await {
            Ok(backlog) => self.config.daily_limit_for_backlog(backlog),
            Err(err) => {
                self.report(&err);
                20
            }
        };

        self.daily_limit = Some(limit);
        self.dedup.set_capacity(limit as usize);
        Some(limit)
    }

    fn report(&self, err: &dyn std::fmt::Display) {
        tracing::warn!(account = %self.account_id, %err, "worker error");
        self.bus.publish(ReviewEvent::internal_exception(
            Some(self.account_id),
            err.to_string(),
        ));
    }
}
