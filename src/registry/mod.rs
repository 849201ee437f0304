//! Account registry and watcher lifecycle
//!
//! [`ReviewWatcher`] is the public entry point. It owns the process-wide
//! pieces (push-feed listener, admission scheduler, event bus, daily-reset
//! worker) and a registry of per-account session detectors. Registration is
//! keyed by account id; at most one detector runs per account.
//!
//! Push routing goes through the bus: the watcher subscribes its own
//! `UserEnteredQueue` handler which forwards each decoded push to the
//! matching detector's command channel. Pushes for untracked accounts are
//! dropped.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::events::{EventBus, EventBusError, EventTopic, ReviewEvent};
use crate::fetcher::ReviewFetcher;
use crate::session::{DetectorCommand, SessionDetector};
use crate::throttle::ThrottleState;
use crate::types::{AccountId, PushEvent};

/// Subscription key of the internal push router.
const ROUTER_KEY: &str = "watcher-account-router";

/// Fallback wait when the next UTC midnight cannot be computed.
const RESET_FALLBACK_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from watcher lifecycle and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("watcher is already started")]
    AlreadyStarted,

    #[error("account {0} is already tracked")]
    AccountAlreadyTracked(AccountId),

    #[error("account {0} is not tracked")]
    AccountNotTracked(AccountId),

    #[error(transparent)]
    Bus(#[from] EventBusError),
}

/// A registered account's running worker.
struct AccountHandle {
    commands: mpsc::Sender<DetectorCommand>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Background tasks owned by a started watcher.
struct RuntimeTasks {
    listener: JoinHandle<()>,
    reset_worker: JoinHandle<()>,
}

/// Tracks reviewing sessions for a set of accounts.
///
/// Construct with a validated [`WatcherConfig`] and a [`ReviewFetcher`],
/// subscribe handlers on [`bus`](Self::bus), register accounts, then
/// [`start`](Self::start). Dropping the watcher without
/// [`shutdown`](Self::shutdown) aborts nothing; workers stop once their
/// cancellation tokens fire or their channels close.
pub struct ReviewWatcher {
    config: Arc<WatcherConfig>,
    bus: EventBus,
    throttle: Arc<ThrottleState>,
    fetcher: Arc<dyn ReviewFetcher>,
    accounts: Arc<DashMap<AccountId, AccountHandle>>,
    cancel: CancellationToken,
    runtime: Mutex<Option<RuntimeTasks>>,
}

impl ReviewWatcher {
    #[must_use]
    pub fn new(config: WatcherConfig, fetcher: Arc<dyn ReviewFetcher>) -> Self {
        let config = Arc::new(config);
        Self {
            throttle: Arc::new(ThrottleState::new(&config)),
            config,
            bus: EventBus::new(),
            fetcher,
            accounts: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
            runtime: Mutex::new(None),
        }
    }

    /// The bus carrying every event this watcher emits.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Start the push-feed listener and the daily-reset worker.
    ///
    /// # Errors
    /// [`WatcherError::AlreadyStarted`] on a second call; a bus error if the
    /// internal router key is somehow taken.
    pub fn start(&self) -> Result<(), WatcherError> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            return Err(WatcherError::AlreadyStarted);
        }

        let accounts = Arc::clone(&self.accounts);
        self.bus
            .subscribe(EventTopic::UserEnteredQueue, ROUTER_KEY, move |event| {
                let accounts = Arc::clone(&accounts);
                async move { route_push(&accounts, event).await }
            })?;

        let listener = crate::dashboard::DashboardListener::spawn(
            Arc::clone(&self.config),
            self.bus.clone(),
            self.cancel.child_token(),
        );
        let reset_worker = tokio::spawn(daily_reset_worker(
            Arc::clone(&self.accounts),
            self.cancel.child_token(),
        ));

        *runtime = Some(RuntimeTasks {
            listener,
            reset_worker,
        });
        tracing::info!(url = self.config.dashboard_url(), "watcher started");
        Ok(())
    }

    /// Begin tracking an account. `moderator` accounts have no daily review
    /// limit.
    ///
    /// # Errors
    /// [`WatcherError::AccountAlreadyTracked`] if a detector for this
    /// account is already running.
    pub fn register_account(
        &self,
        account_id: AccountId,
        moderator: bool,
    ) -> Result<(), WatcherError> {
        let entry = self.accounts.entry(account_id);
        let dashmap::mapref::entry::Entry::Vacant(vacant) = entry else {
            return Err(WatcherError::AccountAlreadyTracked(account_id));
        };

        let cancel = self.cancel.child_token();
        let (commands, join) = SessionDetector::spawn(
            account_id,
            moderator,
            Arc::clone(&self.config),
            self.bus.clone(),
            Arc::clone(&self.throttle),
            Arc::clone(&self.fetcher),
            cancel.clone(),
        );

        vacant.insert(AccountHandle {
            commands,
            cancel,
            join,
        });
        tracing::info!(account = %account_id, moderator, "account registered");
        Ok(())
    }

    /// Stop tracking an account: cancel its worker, wait for it to finish
    /// and drop its scheduler state. No `ReviewingCompleted` is emitted for
    /// a session cut short this way.
    ///
    /// # Errors
    /// [`WatcherError::AccountNotTracked`] if the account is not registered.
    pub async fn unregister_account(&self, account_id: AccountId) -> Result<(), WatcherError> {
        let (_, handle) = self
            .accounts
            .remove(&account_id)
            .ok_or(WatcherError::AccountNotTracked(account_id))?;

        handle.cancel.cancel();
        drop(handle.commands);
        if let Err(err) = handle.join.await {
            tracing::warn!(account = %account_id, %err, "account worker ended abnormally");
        }

        self.throttle.forget(account_id);
        tracing::info!(account = %account_id, "account unregistered");
        Ok(())
    }

    #[must_use]
    pub fn is_tracking(&self, account_id: AccountId) -> bool {
        self.accounts.contains_key(&account_id)
    }

    /// Ids of all currently tracked accounts, in no particular order.
    #[must_use]
    pub fn tracked_accounts(&self) -> Vec<AccountId> {
        self.accounts.iter().map(|entry| *entry.key()).collect()
    }

    /// Stop everything: the listener, the reset worker and every account
    /// worker. Waits for all of them to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let runtime = self.runtime.lock().take();
        if let Some(tasks) = runtime {
            let _ = tasks.listener.await;
            let _ = tasks.reset_worker.await;
            let _ = self.bus.unsubscribe(EventTopic::UserEnteredQueue, ROUTER_KEY);
        }

        let ids = self.tracked_accounts();
        for account_id in ids {
            if let Some((_, handle)) = self.accounts.remove(&account_id) {
                drop(handle.commands);
                if let Err(err) = handle.join.await {
                    tracing::warn!(account = %account_id, %err, "account worker ended abnormally");
                }
                self.throttle.forget(account_id);
            }
        }

        tracing::info!("watcher stopped");
    }
}

/// Forward a decoded push to the matching account's worker, if tracked.
async fn route_push(
    accounts: &DashMap<AccountId, AccountHandle>,
    event: ReviewEvent,
) -> anyhow::Result<()> {
    let ReviewEvent::UserEnteredQueue {
        queue,
        account_id,
        arrived_at,
    } = event
    else {
        return Ok(());
    };

    let commands = accounts
        .get(&account_id)
        .map(|handle| handle.commands.clone());
    let Some(commands) = commands else {
        return Ok(());
    };

    commands
        .send(DetectorCommand::Push(PushEvent {
            queue,
            account_id,
            arrived_at,
        }))
        .await
        .map_err(|_| anyhow::anyhow!("worker channel for account {account_id} is closed"))
}

/// Sleeps until each UTC midnight and broadcasts `DailyReset` to every
/// tracked account's worker.
async fn daily_reset_worker(
    accounts: Arc<DashMap<AccountId, AccountHandle>>,
    cancel: CancellationToken,
) {
    loop {
        let wait = until_next_utc_midnight().unwrap_or(RESET_FALLBACK_WAIT);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        tracing::info!("daily reset");
        let senders: Vec<_> = accounts
            .iter()
            .map(|entry| entry.commands.clone())
            .collect();
        for commands in senders {
            let _ = commands.send(DetectorCommand::DailyReset).await;
        }
    }
}

fn until_next_utc_midnight() -> Option<Duration> {
    let now = chrono::Utc::now();
    let midnight = now.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc();
    (midnight - now).to_std().ok()
}
