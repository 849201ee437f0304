//! The page-fetcher boundary
//!
//! Everything that talks to the remote service lives behind the
//! [`ReviewFetcher`] trait: fetching recent review-item ids, resolving a full
//! review record, reading the completed-today counter, refreshing the session
//! token and reading the queue backlog. The watcher never issues HTTP
//! requests itself, which keeps the control loop testable against a scripted
//! fetcher.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{AccountId, ItemId, ReviewRecord};

/// Fixed delay before retrying a transient remote failure.
///
/// The remote answers "temporarily unavailable" in bursts that clear within
/// a few seconds; 15 s is a safe retry distance.
pub const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Failure fetching data from the remote service.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network or service hiccup; safe to retry after `retry_after`.
    #[error("transient fetch failure: {message}")]
    Transient {
        message: String,
        retry_after: Duration,
    },

    /// Malformed or unexpected response; retrying will not help.
    #[error("permanent fetch failure: {message}")]
    Permanent { message: String },
}

impl FetchError {
    /// A transient failure with the default retry delay.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: TRANSIENT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Whether the operation may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The suggested retry delay for retryable failures.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => Some(*retry_after),
            Self::Permanent { .. } => None,
        }
    }
}

/// Interface to the remote review service.
///
/// Implementations are expected to be cheap to share (`Arc<dyn
/// ReviewFetcher>`) and internally stateless; throttling is the caller's
/// responsibility via the admission scheduler.
#[async_trait]
pub trait ReviewFetcher: Send + Sync {
    /// The `count` most recent review-item ids completed by `account_id`,
    /// newest first.
    async fn latest_review_ids(
        &self,
        token: &str,
        account_id: AccountId,
        count: usize,
    ) -> Result<Vec<ItemId>, FetchError>;

    /// Resolve a review item into a fully parsed record.
    async fn review_record(
        &self,
        token: &str,
        item_id: ItemId,
    ) -> Result<ReviewRecord, FetchError>;

    /// How many reviews the account has completed today, as reported by the
    /// remote service.
    async fn completed_count(
        &self,
        token: &str,
        account_id: AccountId,
    ) -> Result<u32, FetchError>;

    /// Obtain a fresh session token. Tokens expire daily.
    async fn refresh_token(&self) -> Result<String, FetchError>;

    /// Number of items currently waiting in the review queue. Drives the
    /// 40-vs-20 daily-limit decision.
    async fn queue_backlog(&self) -> Result<u32, FetchError>;
}
