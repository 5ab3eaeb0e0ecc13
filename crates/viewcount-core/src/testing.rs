//! Failure-injecting store wrappers for exercising re-queue paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, ViewCountError};
use crate::ids::{ItemId, UserId};
use crate::memory::{MemoryCounterStore, MemoryPendingStore};
use crate::store::{CounterStore, PendingStore, ViewRecord};

/// Counter store that fails or stalls on demand, delegating everything else
/// to a `MemoryCounterStore`.
#[derive(Debug, Default)]
pub struct FlakyCounterStore {
    inner: MemoryCounterStore,
    failing_increments: AtomicUsize,
    failing_records: AtomicUsize,
    passing_records: AtomicUsize,
    failing_items: Mutex<HashSet<ItemId>>,
    increment_delay: Mutex<Option<Duration>>,
    increment_calls: AtomicUsize,
}

impl FlakyCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` increments regardless of item.
    pub fn fail_next_increments(&self, count: usize) {
        self.failing_increments.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` record inserts regardless of item.
    pub fn fail_next_records(&self, count: usize) {
        self.failing_records.store(count, Ordering::SeqCst);
    }

    /// Let `count` record inserts through before `fail_next_records` kicks in.
    pub fn pass_next_records(&self, count: usize) {
        self.passing_records.store(count, Ordering::SeqCst);
    }

    /// Fail every increment for `item` until `heal_item` is called.
    pub fn fail_item(&self, item: ItemId) {
        self.failing_items.lock().insert(item);
    }

    pub fn heal_item(&self, item: ItemId) {
        self.failing_items.lock().remove(&item);
    }

    /// Sleep before every increment (`None` disables the delay).
    pub fn delay_increments(&self, delay: Option<Duration>) {
        *self.increment_delay.lock() = delay;
    }

    pub fn increment_calls(&self) -> usize {
        self.increment_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryCounterStore {
        &self.inner
    }

    fn consume(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CounterStore for FlakyCounterStore {
    async fn increment_views(&self, item: ItemId, delta: u64) -> Result<u64> {
        self.increment_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.increment_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_items.lock().contains(&item) || Self::consume(&self.failing_increments) {
            return Err(ViewCountError::commit_failure(item, "injected increment failure"));
        }
        self.inner.increment_views(item, delta).await
    }

    async fn record_view(&self, record: &ViewRecord) -> Result<bool> {
        if !Self::consume(&self.passing_records) && Self::consume(&self.failing_records) {
            return Err(ViewCountError::commit_failure(
                record.item_id,
                "injected record failure",
            ));
        }
        self.inner.record_view(record).await
    }

    async fn total_views(&self, item: ItemId) -> Result<u64> {
        self.inner.total_views(item).await
    }

    async fn has_viewed(&self, item: ItemId, user: UserId) -> Result<bool> {
        self.inner.has_viewed(item, user).await
    }

    async fn view_history(&self, user: UserId) -> Result<Vec<ViewRecord>> {
        self.inner.view_history(user).await
    }
}

/// Pending store that can be switched offline.
#[derive(Debug, Default)]
pub struct OfflinePendingStore {
    inner: MemoryPendingStore,
    offline: AtomicBool,
}

impl OfflinePendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ViewCountError::store_unavailable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl PendingStore for OfflinePendingStore {
    async fn add(
        &self,
        item: ItemId,
        user: UserId,
        expire_after: Option<Duration>,
    ) -> Result<bool> {
        self.check()?;
        self.inner.add(item, user, expire_after).await
    }

    async fn members(&self, item: ItemId) -> Result<HashSet<UserId>> {
        self.check()?;
        self.inner.members(item).await
    }

    async fn take(&self, item: ItemId) -> Result<HashSet<UserId>> {
        self.check()?;
        self.inner.take(item).await
    }

    async fn pending_count(&self, item: ItemId) -> Result<usize> {
        self.check()?;
        self.inner.pending_count(item).await
    }

    async fn restore(&self, item: ItemId, users: &HashSet<UserId>) -> Result<()> {
        self.check()?;
        self.inner.restore(item, users).await
    }

    async fn take_requeued(&self, item: ItemId) -> Result<Vec<HashSet<UserId>>> {
        self.check()?;
        self.inner.take_requeued(item).await
    }

    async fn pending_items(&self) -> Result<Vec<ItemId>> {
        self.check()?;
        self.inner.pending_items().await
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.check()?;
        self.inner.purge_expired().await
    }
}
