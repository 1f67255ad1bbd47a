//! Subscription ledger storage trait.

use super::types::{Subscription, SubscriptionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Keyset position just past the last row of a batch.
///
/// Due-row queries are ordered by a timestamp and then by id; a cursor
/// resumes strictly after `(at, id)`, so rows left in place (deferred or
/// failed) are not fetched again within the same pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchCursor {
    pub at: DateTime<Utc>,
    pub id: String,
}

impl BatchCursor {
    pub fn new(at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self { at, id: id.into() }
    }

    /// Whether a row keyed `(at, id)` sorts after this cursor.
    #[must_use]
    pub fn precedes(&self, at: DateTime<Utc>, id: &str) -> bool {
        (at, id) > (self.at, self.id.as_str())
    }
}

/// Persistence for ledger entries.
///
/// Implementations must make [`insert`](Self::insert) of an `Active` row and
/// [`transition`](Self::transition) atomic: they are the only coordination
/// between request handlers and the lifecycle scheduler.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a new entry.
    ///
    /// Fails with `CampusError::Conflict` if the institute already has an
    /// entry in the same status and that status is `Active` or `Upcoming`.
    async fn insert(&self, subscription: &Subscription) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Subscription>>;

    /// The institute's `Active` entry, if any.
    async fn active_for(&self, institute_id: &str) -> Result<Option<Subscription>>;

    /// The institute's queued `Upcoming` entry, if any.
    async fn upcoming_for(&self, institute_id: &str) -> Result<Option<Subscription>>;

    /// Every entry of an institute, newest `period_start` first.
    async fn list_for_institute(&self, institute_id: &str) -> Result<Vec<Subscription>>;

    /// Up to `limit` entries in `Active` or `Upcoming` with `period_expiry < now`,
    /// ordered by `(period_expiry, id)` and starting after `after`.
    async fn due_for_expiry(
        &self,
        now: DateTime<Utc>,
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Subscription>>;

    /// Up to `limit` `Upcoming` entries with `period_start <= now`, ordered by
    /// `(period_start, id)` and starting after `after`.
    async fn due_for_activation(
        &self,
        now: DateTime<Utc>,
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Subscription>>;

    /// Move an entry from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `true` if this call performed the change. Moving to `Active`
    /// also fails with `Conflict` if another entry of the institute is active.
    async fn transition(
        &self,
        id: &str,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<bool>;

    /// Number of `Active` entries for an institute (0 or 1 when healthy).
    async fn count_active(&self, institute_id: &str) -> Result<u32>;

    /// Delete every entry of an institute. Returns the number removed.
    async fn delete_for_institute(&self, institute_id: &str) -> Result<u64>;
}
