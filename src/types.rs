//! Core data types shared across the watcher
//!
//! Identifiers are newtypes over `u64` so account ids, review item ids and
//! queue ids cannot be mixed up at call sites. `ReviewRecord` is immutable
//! once constructed and is shared between the session window and subscribers
//! via `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of a tracked remote user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single review item on the remote queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a review queue on the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The action a reviewer took on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewAction {
    LeaveOpen,
    Close,
    Edit,
}

/// One reviewer's action on a review item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    /// The account that took the action.
    pub actor: AccountId,
    pub action: ReviewAction,
    /// When the action was taken (UTC).
    pub timestamp: DateTime<Utc>,
}

/// A fully parsed review item fetched from the remote service.
///
/// Immutable after construction; never mutated by the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: ItemId,
    /// All actions taken on this item, in the order the remote reports them.
    pub results: Vec<ReviewResult>,
    /// `None` if this item was not an audit, otherwise whether it was passed.
    pub audit_passed: Option<bool>,
    /// Tags of the reviewed question.
    pub tags: Vec<String>,
}

impl ReviewRecord {
    /// The result entry belonging to the given account, if any.
    #[must_use]
    pub fn result_for(&self, account: AccountId) -> Option<&ReviewResult> {
        self.results.iter().find(|r| r.actor == account)
    }

    /// The timestamp at which the given account acted on this item.
    #[must_use]
    pub fn timestamp_for(&self, account: AccountId) -> Option<DateTime<Utc>> {
        self.result_for(account).map(|r| r.timestamp)
    }

    /// True if this item is a failed audit.
    #[must_use]
    pub fn is_failed_audit(&self) -> bool {
        self.audit_passed == Some(false)
    }
}

/// A decoded push-feed notification: an account entered a review queue.
///
/// Transient value; consumed immediately by the matching session detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushEvent {
    pub queue: QueueId,
    pub account_id: AccountId,
    /// When the frame arrived locally (UTC).
    pub arrived_at: DateTime<Utc>,
}

/// Summary of one completed reviewing session, carried by
/// [`ReviewingCompleted`](crate::events::ReviewEvent::ReviewingCompleted).
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub account_id: AccountId,
    /// Session start (push arrival minus the configured safety margin).
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every record accumulated during the session, in fetch order.
    pub records: Vec<Arc<ReviewRecord>>,
    /// Timestamp of the most recent confirmed review, if any was observed.
    pub latest_activity: Option<DateTime<Utc>>,
}

impl SessionSummary {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}
