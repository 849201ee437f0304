//! Event type definitions
//!
//! A closed set of typed event variants replaces the dynamic delegate
//! dispatch of older designs: every event carries concrete payloads, and
//! [`EventTopic`] is the discriminant handlers subscribe under.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::types::{AccountId, QueueId, ReviewRecord, SessionSummary};

/// Topic discriminant for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// A push notification matched a tracked queue.
    UserEnteredQueue,
    ReviewingStarted,
    ItemReviewed,
    AuditPassed,
    AuditFailed,
    ReviewingCompleted,
    /// An error happened inside the watcher; the system keeps running.
    InternalException,
}

/// Events emitted while tracking review activity.
#[derive(Debug, Clone)]
pub enum ReviewEvent {
    /// An account entered a review queue (decoded from the push feed).
    UserEnteredQueue {
        queue: QueueId,
        account_id: AccountId,
        arrived_at: DateTime<Utc>,
    },
    /// The account's first confirmed activity after idling.
    ReviewingStarted {
        account_id: AccountId,
        /// Session start, back-dated by the configured safety margin.
        started_at: DateTime<Utc>,
    },
    /// A review item was completed (fires for audits too).
    ItemReviewed {
        account_id: AccountId,
        record: Arc<ReviewRecord>,
    },
    AuditPassed {
        account_id: AccountId,
        record: Arc<ReviewRecord>,
    },
    AuditFailed {
        account_id: AccountId,
        record: Arc<ReviewRecord>,
    },
    /// The session closed (daily limit, audit-failure timeout, idle timeout
    /// or daily reset), with everything accumulated since it started.
    ReviewingCompleted {
        account_id: AccountId,
        session: SessionSummary,
    },
    /// An internal error, surfaced instead of crashing a worker.
    InternalException {
        /// The account whose worker hit the error, when attributable.
        account_id: Option<AccountId>,
        message: String,
    },
}

impl ReviewEvent {
    /// The topic this event is dispatched under.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::UserEnteredQueue { .. } => EventTopic::UserEnteredQueue,
            Self::ReviewingStarted { .. } => EventTopic::ReviewingStarted,
            Self::ItemReviewed { .. } => EventTopic::ItemReviewed,
            Self::AuditPassed { .. } => EventTopic::AuditPassed,
            Self::AuditFailed { .. } => EventTopic::AuditFailed,
            Self::ReviewingCompleted { .. } => EventTopic::ReviewingCompleted,
            Self::InternalException { .. } => EventTopic::InternalException,
        }
    }

    /// The account this event concerns, if attributable to one.
    #[must_use]
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::UserEnteredQueue { account_id, .. }
            | Self::ReviewingStarted { account_id, .. }
            | Self::ItemReviewed { account_id, .. }
            | Self::AuditPassed { account_id, .. }
            | Self::AuditFailed { account_id, .. }
            | Self::ReviewingCompleted { account_id, .. } => Some(*account_id),
            Self::InternalException { account_id, .. } => *account_id,
        }
    }

    /// Create an `InternalException` event.
    #[must_use]
    pub fn internal_exception(account_id: Option<AccountId>, message: impl Into<String>) -> Self {
        Self::InternalException {
            account_id,
            message: message.into(),
        }
    }

    /// Create the audit outcome event for a record, if it was an audit.
    #[must_use]
    pub fn audit_outcome(account_id: AccountId, record: &Arc<ReviewRecord>) -> Option<Self> {
        match record.audit_passed {
            Some(true) => Some(Self::AuditPassed {
                account_id,
                record: Arc::clone(record),
            }),
            Some(false) => Some(Self::AuditFailed {
                account_id,
                record: Arc::clone(record),
            }),
            None => None,
        }
    }
}
