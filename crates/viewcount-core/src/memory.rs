//! In-memory store implementations.
//!
//! `MemoryPendingStore` is the default pending-set backend for a single
//! process: one mutex guards all pending state, so add-if-absent and take
//! are trivially atomic. `MemoryCounterStore` is the
//! reference durable store used by tests and embedders without a database.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::ids::{ItemId, UserId};
use crate::store::{CounterStore, PendingStore, ViewRecord};

#[derive(Debug, Default)]
struct PendingState {
    pending: HashMap<ItemId, HashSet<UserId>>,
    // Batches handed back after a failed flush, one entry per restore.
    requeued: HashMap<ItemId, Vec<HashSet<UserId>>>,
    // Expiry deadline per accepted pair; only populated with a fixed window.
    marks: HashMap<(ItemId, UserId), Instant>,
}

/// Mutex-backed pending-set store.
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    state: Mutex<PendingState>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live dedup marks, expired or not.
    pub fn mark_count(&self) -> usize {
        self.state.lock().marks.len()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn add(
        &self,
        item: ItemId,
        user: UserId,
        expire_after: Option<Duration>,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut guard = self.state.lock();

        if let Some(deadline) = guard.marks.get(&(item, user)) {
            if *deadline > now {
                return Ok(false);
            }
        }

        let inserted = guard.pending.entry(item).or_default().insert(user);
        if inserted {
            match expire_after {
                Some(window) => {
                    guard.marks.insert((item, user), now + window);
                }
                None => {
                    guard.marks.remove(&(item, user));
                }
            }
        }

        Ok(inserted)
    }

    async fn members(&self, item: ItemId) -> Result<HashSet<UserId>> {
        Ok(self
            .state
            .lock()
            .pending
            .get(&item)
            .cloned()
            .unwrap_or_default())
    }

    async fn pending_count(&self, item: ItemId) -> Result<usize> {
        let guard = self.state.lock();
        let fresh = guard.pending.get(&item).map_or(0, HashSet::len);
        let requeued: usize = guard
            .requeued
            .get(&item)
            .map_or(0, |batches| batches.iter().map(HashSet::len).sum());
        Ok(fresh + requeued)
    }

    async fn take(&self, item: ItemId) -> Result<HashSet<UserId>> {
        Ok(self.state.lock().pending.remove(&item).unwrap_or_default())
    }

    async fn restore(&self, item: ItemId, users: &HashSet<UserId>) -> Result<()> {
        if users.is_empty() {
            return Ok(());
        }
        self.state
            .lock()
            .requeued
            .entry(item)
            .or_default()
            .push(users.clone());
        Ok(())
    }

    async fn take_requeued(&self, item: ItemId) -> Result<Vec<HashSet<UserId>>> {
        Ok(self.state.lock().requeued.remove(&item).unwrap_or_default())
    }

    async fn pending_items(&self) -> Result<Vec<ItemId>> {
        let guard = self.state.lock();
        let items: BTreeSet<ItemId> = guard
            .pending
            .iter()
            .filter(|(_, users)| !users.is_empty())
            .map(|(item, _)| *item)
            .chain(guard.requeued.keys().copied())
            .collect();
        Ok(items.into_iter().collect())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let before = guard.marks.len();
        guard.marks.retain(|_, deadline| *deadline > now);
        Ok(before - guard.marks.len())
    }
}

#[derive(Debug, Default)]
struct CounterState {
    totals: HashMap<ItemId, u64>,
    records: HashMap<(ItemId, UserId), ViewRecord>,
}

/// Mutex-backed durable counter store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    state: Mutex<CounterState>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_views(&self, item: ItemId, delta: u64) -> Result<u64> {
        let mut guard = self.state.lock();
        let total = guard.totals.entry(item).or_insert(0);
        *total = total.saturating_add(delta);
        Ok(*total)
    }

    async fn record_view(&self, record: &ViewRecord) -> Result<bool> {
        let mut guard = self.state.lock();
        let key = (record.item_id, record.user_id);
        if guard.records.contains_key(&key) {
            return Ok(false);
        }
        guard.records.insert(key, record.clone());
        Ok(true)
    }

    async fn total_views(&self, item: ItemId) -> Result<u64> {
        Ok(self.state.lock().totals.get(&item).copied().unwrap_or(0))
    }

    async fn has_viewed(&self, item: ItemId, user: UserId) -> Result<bool> {
        Ok(self.state.lock().records.contains_key(&(item, user)))
    }

    async fn view_history(&self, user: UserId) -> Result<Vec<ViewRecord>> {
        let guard = self.state.lock();
        let mut history: Vec<ViewRecord> = guard
            .records
            .values()
            .filter(|record| record.user_id == user)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(raw: i64) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    fn user(raw: i64) -> UserId {
        UserId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent_per_pair() {
        let store = MemoryPendingStore::new();
        assert!(store.add(item(1), user(1), None).await.unwrap());
        assert!(!store.add(item(1), user(1), None).await.unwrap());
        assert!(store.add(item(1), user(2), None).await.unwrap());
        assert!(store.add(item(2), user(1), None).await.unwrap());

        assert_eq!(store.members(item(1)).await.unwrap().len(), 2);
        assert_eq!(store.mark_count(), 0);
    }

    #[tokio::test]
    async fn test_take_clears_and_restore_keeps_batches_apart() {
        let store = MemoryPendingStore::new();
        store.add(item(5), user(1), None).await.unwrap();
        store.add(item(5), user(2), None).await.unwrap();

        let taken = store.take(item(5)).await.unwrap();
        assert_eq!(taken, HashSet::from([user(1), user(2)]));
        assert!(store.members(item(5)).await.unwrap().is_empty());
        assert!(store.pending_items().await.unwrap().is_empty());

        // User 1 views again after the take: a new window, counted on its own.
        assert!(store.add(item(5), user(1), None).await.unwrap());
        store.restore(item(5), &taken).await.unwrap();
        assert_eq!(
            store.members(item(5)).await.unwrap(),
            HashSet::from([user(1)])
        );
        assert_eq!(store.pending_count(item(5)).await.unwrap(), 3);

        // Restored batches do not suppress new views.
        assert!(store.add(item(5), user(2), None).await.unwrap());

        store.restore(item(6), &HashSet::new()).await.unwrap();
        assert_eq!(store.pending_items().await.unwrap(), vec![item(5)]);

        assert_eq!(store.take_requeued(item(5)).await.unwrap(), vec![taken]);
        assert!(store.take_requeued(item(5)).await.unwrap().is_empty());
        assert_eq!(store.pending_count(item(5)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_requeued_only_item_is_listed() {
        let store = MemoryPendingStore::new();
        store
            .restore(item(9), &HashSet::from([user(1)]))
            .await
            .unwrap();

        assert_eq!(store.pending_items().await.unwrap(), vec![item(9)]);
        assert!(store.members(item(9)).await.unwrap().is_empty());
        assert_eq!(store.pending_count(item(9)).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_outlive_take_until_expiry() {
        let store = MemoryPendingStore::new();
        let window = Some(Duration::from_secs(60));

        assert!(store.add(item(1), user(1), window).await.unwrap());
        store.take(item(1)).await.unwrap();
        assert!(!store.add(item(1), user(1), window).await.unwrap());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.add(item(1), user(1), window).await.unwrap());
    }

    #[tokio::test]
    async fn test_counter_store_totals_and_records() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.total_views(item(3)).await.unwrap(), 0);
        assert_eq!(store.increment_views(item(3), 2).await.unwrap(), 2);
        assert_eq!(store.increment_views(item(3), 5).await.unwrap(), 7);

        let older = ViewRecord {
            item_id: item(3),
            user_id: user(1),
            viewed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let newer = ViewRecord {
            item_id: item(4),
            user_id: user(1),
            viewed_at: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        };
        assert!(store.record_view(&older).await.unwrap());
        assert!(!store.record_view(&older).await.unwrap());
        assert!(store.record_view(&newer).await.unwrap());

        assert!(store.has_viewed(item(3), user(1)).await.unwrap());
        assert!(!store.has_viewed(item(3), user(2)).await.unwrap());

        let history = store.view_history(user(1)).await.unwrap();
        assert_eq!(history, vec![newer, older]);
        assert_eq!(store.record_count(), 2);
    }
}
