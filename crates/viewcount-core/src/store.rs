// Storage traits for pending viewer sets and durable view counters
//
// Implementations:
// - MemoryPendingStore / MemoryCounterStore (single process, tests)
// - anything backed by a key-value cache or relational store

use crate::error::Result;
use crate::ids::{ItemId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Low-latency set store holding viewers that have not been flushed yet.
///
/// Every method must be atomic with respect to the others for the same item.
/// `take` in particular is the only synchronization point between request
/// handlers and the flusher: it must read the set and replace it with an
/// empty one in a single step.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Add `user` to the pending set of `item` unless already present.
    ///
    /// With `expire_after` set, an accepted add also leaves a dedup mark that
    /// outlives `take` and rejects the same pair until it expires.
    /// Returns `true` when the user was added.
    async fn add(&self, item: ItemId, user: UserId, expire_after: Option<Duration>)
        -> Result<bool>;

    /// Current members of the pending set for `item`.
    async fn members(&self, item: ItemId) -> Result<HashSet<UserId>>;

    /// Views waiting for `item`: the pending set plus every re-queued batch.
    async fn pending_count(&self, item: ItemId) -> Result<usize>;

    /// Atomically return the pending set for `item` and clear it.
    async fn take(&self, item: ItemId) -> Result<HashSet<UserId>>;

    /// Queue previously taken users of `item` for the next flush.
    ///
    /// The batch is kept apart from the pending set: a user who viewed again
    /// after the take belongs to a new window and counts separately. Restored
    /// batches do not affect `add`.
    async fn restore(&self, item: ItemId, users: &HashSet<UserId>) -> Result<()>;

    /// Atomically return every re-queued batch for `item` and clear them.
    async fn take_requeued(&self, item: ItemId) -> Result<Vec<HashSet<UserId>>>;

    /// Items with pending viewers or re-queued batches, as a snapshot.
    async fn pending_items(&self) -> Result<Vec<ItemId>>;

    /// Drop dedup marks whose window has elapsed. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Durable per-user view row, unique on (item, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub viewed_at: DateTime<Utc>,
}

/// Durable store holding authoritative view totals.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `delta` to the total for `item`, returning the new total.
    async fn increment_views(&self, item: ItemId, delta: u64) -> Result<u64>;

    /// Insert a view record. Returns `false` when the (item, user) pair
    /// already exists, which makes replays after a re-queue harmless.
    async fn record_view(&self, record: &ViewRecord) -> Result<bool>;

    /// Confirmed total for `item` (zero when never flushed).
    async fn total_views(&self, item: ItemId) -> Result<u64>;

    async fn has_viewed(&self, item: ItemId, user: UserId) -> Result<bool>;

    /// View records for `user`, most recent first.
    async fn view_history(&self, user: UserId) -> Result<Vec<ViewRecord>>;
}
