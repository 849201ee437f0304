//! Global admission scheduler
//!
//! Process-wide throttle state shared by every account worker. It converts
//! the configured request-per-minute ceiling into a per-account polling
//! interval that adapts as accounts come and go: a sliding window of recent
//! successful fetch timestamps measures actual throughput, and accounts with
//! pending push-confirmed activity contribute a fractional reservation so
//! active reviewers are serviced ahead of idle background polls.
//!
//! The scheduler never blocks and never sleeps; it is pure arithmetic over
//! shared counters. Workers own the actual waits. Timestamps use
//! `tokio::time::Instant` so the whole thing runs under `tokio::time::pause()`
//! in tests.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::WatcherConfig;
use crate::types::AccountId;

/// Length of the sliding success window.
const WINDOW_LENGTH: Duration = Duration::from_secs(60);

/// Keeps `secs_per_request` finite when observed throughput reaches the
/// ceiling.
const OBSERVED_RATE_EPSILON: f64 = 0.25;

/// Shared throttle state; the admission scheduler of the process.
///
/// Mutated concurrently by every account worker: `record_request` appends to
/// the success window, `note_push` bumps an account's pending count. Reads
/// (`next_interval`) prune and aggregate under the same fine-grained locks,
/// so no multi-step transaction spans more than one logical update.
#[derive(Debug)]
pub struct ThrottleState {
    /// Timestamps of recent remote calls, oldest first.
    window: Mutex<VecDeque<Instant>>,
    /// Push notifications not yet serviced by the account's worker.
    pending: DashMap<AccountId, u32>,
    ceiling: f64,
    background_factor: f64,
    min_poll_interval: Duration,
}

impl ThrottleState {
    /// Build from a validated configuration (the builder guarantees a
    /// positive ceiling and a background factor of at least 1).
    #[must_use]
    pub fn new(config: &WatcherConfig) -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            pending: DashMap::new(),
            ceiling: config.max_requests_per_minute(),
            background_factor: config.background_poll_factor(),
            min_poll_interval: config.min_poll_interval(),
        }
    }

    /// Record one actual remote call. Must be called before every request a
    /// worker sends, so the window reflects real throughput.
    pub fn record_request(&self) {
        let mut window = self.window.lock();
        let now = Instant::now();
        Self::prune(&mut window, now);
        window.push_back(now);
    }

    /// Note a push notification for an account (pending confirmation).
    pub fn note_push(&self, account_id: AccountId) {
        *self.pending.entry(account_id).or_insert(0) += 1;
    }

    /// Consume and return the account's pending push count.
    pub fn take_pending(&self, account_id: AccountId) -> u32 {
        self.pending
            .get_mut(&account_id)
            .map(|mut count| std::mem::take(&mut *count))
            .unwrap_or(0)
    }

    /// Current pending push count for an account, without consuming it.
    #[must_use]
    pub fn pending_count(&self, account_id: AccountId) -> u32 {
        self.pending.get(&account_id).map_or(0, |count| *count)
    }

    /// Drop all state for an unregistered account.
    pub fn forget(&self, account_id: AccountId) {
        self.pending.remove(&account_id);
    }

    /// How long the given account's worker should wait before its next
    /// batch fetch.
    ///
    /// Observed rate is the success-window count plus `1/background_factor`
    /// for every account with unserviced push activity (a reservation for
    /// the poll that activity will trigger). Background-verification polls
    /// are stretched by `background_factor` and floored at
    /// `background_factor` seconds. The result is never below the configured
    /// minimum, so an empty account set cannot busy-loop.
    #[must_use]
    pub fn next_interval(&self, _account_id: AccountId, is_background_poll: bool) -> Duration {
        let observed = self.observed_rate();
        let headroom = (self.ceiling - observed).max(OBSERVED_RATE_EPSILON);
        let mut secs_per_request = 60.0 / headroom;

        if is_background_poll {
            secs_per_request = (secs_per_request * self.background_factor)
                .max(self.background_factor);
        }

        Duration::from_secs_f64(secs_per_request).max(self.min_poll_interval)
    }

    /// Requests per minute the scheduler currently believes are in flight.
    #[must_use]
    pub fn observed_rate(&self) -> f64 {
        let mut window = self.window.lock();
        Self::prune(&mut window, Instant::now());
        let measured = window.len() as f64;
        drop(window);

        let reserved: f64 = self
            .pending
            .iter()
            .filter(|entry| *entry.value() > 0)
            .count() as f64
            / self.background_factor;

        measured + reserved
    }

    /// Number of requests inside the current 60 s window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        let mut window = self.window.lock();
        Self::prune(&mut window, Instant::now());
        window.len()
    }

    fn prune(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW_LENGTH {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle(ceiling: f64, background_factor: f64) -> ThrottleState {
        let config = WatcherConfig::builder()
            .max_requests_per_minute(ceiling)
            .background_poll_factor(background_factor)
            .build()
            .unwrap();
        ThrottleState::new(&config)
    }

    #[tokio::test(start_paused = true)]
    async fn window_prunes_after_a_minute() {
        let state = throttle(60.0, 8.0);
        state.record_request();
        state.record_request();
        assert_eq!(state.window_len(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(state.window_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_grows_with_observed_rate() {
        let state = throttle(60.0, 8.0);
        let idle = state.next_interval(AccountId(1), false);

        for _ in 0..55 {
            state.record_request();
        }
        let busy = state.next_interval(AccountId(1), false);
        assert!(busy > idle, "{busy:?} should exceed {idle:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn background_polls_are_stretched_and_floored() {
        let state = throttle(60.0, 8.0);
        let foreground = state.next_interval(AccountId(1), false);
        let background = state.next_interval(AccountId(1), true);
        assert!(background >= foreground);
        assert!(background >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_accounts_reserve_fractional_rate() {
        let state = throttle(60.0, 8.0);
        let before = state.observed_rate();

        state.note_push(AccountId(1));
        state.note_push(AccountId(1));
        state.note_push(AccountId(2));
        let after = state.observed_rate();

        // Two accounts with pending activity, 1/8 each.
        assert!((after - before - 0.25).abs() < 1e-9);

        assert_eq!(state.pending_count(AccountId(1)), 2);
        assert_eq!(state.take_pending(AccountId(1)), 2);
        assert_eq!(state.pending_count(AccountId(1)), 0);
        assert_eq!(state.take_pending(AccountId(1)), 0);
        assert_eq!(state.take_pending(AccountId(3)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_never_below_minimum() {
        let state = throttle(10_000.0, 8.0);
        let interval = state.next_interval(AccountId(1), false);
        assert!(interval >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cooperative_worker_stays_within_budget() {
        let state = throttle(30.0, 8.0);
        for _ in 0..200 {
            let wait = state.next_interval(AccountId(1), false);
            tokio::time::advance(wait).await;
            state.record_request();
            assert!(
                state.window_len() <= 30,
                "window holds {} requests",
                state.window_len()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_window_yields_long_interval() {
        let state = throttle(60.0, 8.0);
        for _ in 0..60 {
            state.record_request();
        }
        // Headroom is clamped to epsilon: 60 / 0.25 = 240 s.
        let interval = state.next_interval(AccountId(1), false);
        assert!(interval >= Duration::from_secs(239));
    }
}
