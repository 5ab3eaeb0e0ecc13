//! Hot-path view recording.
//!
//! `track` performs a single add-if-absent against the pending store. The
//! store decides atomicity; this type only validates ids, applies the
//! configured dedup window, and emits metrics.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::trace;
use viewcount_core::{ItemId, PendingStore, Result, UserId};

/// Records "user X viewed item Y" at most once per dedup window.
#[derive(Clone)]
pub struct ViewDeduper {
    store: Arc<dyn PendingStore>,
    window: Option<Duration>,
}

impl ViewDeduper {
    /// `window = None` dedups until the next flush drains the item.
    pub fn new(store: Arc<dyn PendingStore>, window: Option<Duration>) -> Self {
        Self { store, window }
    }

    /// Returns `true` for a new view, `false` when already counted this window.
    ///
    /// Callers must have authenticated the viewer and checked the item exists.
    pub async fn track(&self, item_id: i64, user_id: i64) -> Result<bool> {
        let item = ItemId::new(item_id)?;
        let user = UserId::new(user_id)?;

        let accepted = self.store.add(item, user, self.window).await?;
        if accepted {
            counter!("viewcount.track.accepted", 1);
        } else {
            counter!("viewcount.track.duplicate", 1);
        }
        trace!(item = %item, user = %user, accepted, "Tracked view");

        Ok(accepted)
    }

    /// Atomically take the pending viewers of `item`, leaving an empty set.
    ///
    /// The take starts a new window: a later `track` for a drained user is
    /// accepted and counted in the next flush.
    pub async fn drain(&self, item: ItemId) -> Result<HashSet<UserId>> {
        self.store.take(item).await
    }

    /// Atomically take the batches re-queued for `item` by failed flushes.
    pub async fn drain_requeued(&self, item: ItemId) -> Result<Vec<HashSet<UserId>>> {
        self.store.take_requeued(item).await
    }

    /// Snapshot of items with at least one pending view.
    pub async fn all_pending_item_ids(&self) -> Result<Vec<ItemId>> {
        self.store.pending_items().await
    }

    /// Views recorded for `item` but not flushed yet, re-queued ones included.
    pub async fn pending_views(&self, item: ItemId) -> Result<usize> {
        self.store.pending_count(item).await
    }

    /// Hand drained viewers back so the next flush retries them.
    pub async fn requeue(&self, item: ItemId, users: &HashSet<UserId>) -> Result<()> {
        self.store.restore(item, users).await
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewcount_core::testing::OfflinePendingStore;
    use viewcount_core::{MemoryPendingStore, ViewCountError};

    fn item(raw: i64) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    fn user(raw: i64) -> UserId {
        UserId::new(raw).unwrap()
    }

    fn deduper() -> ViewDeduper {
        ViewDeduper::new(Arc::new(MemoryPendingStore::new()), None)
    }

    #[tokio::test]
    async fn test_second_track_in_window_is_noop() {
        let deduper = deduper();
        assert!(deduper.track(42, 1).await.unwrap());
        assert!(!deduper.track(42, 1).await.unwrap());
        assert_eq!(deduper.pending_views(item(42)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_ids_are_rejected_before_store() {
        let deduper = deduper();
        assert!(matches!(
            deduper.track(0, 1).await,
            Err(ViewCountError::InvalidArgument {
                field: "item_id",
                ..
            })
        ));
        assert!(matches!(
            deduper.track(1, -3).await,
            Err(ViewCountError::InvalidArgument {
                field: "user_id",
                ..
            })
        ));
        assert!(deduper.all_pending_item_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_returns_exactly_accumulated_set() {
        let deduper = deduper();
        for u in [1, 2, 3] {
            deduper.track(42, u).await.unwrap();
        }
        deduper.track(43, 1).await.unwrap();

        let drained = deduper.drain(item(42)).await.unwrap();
        assert_eq!(drained, HashSet::from([user(1), user(2), user(3)]));
        assert_eq!(deduper.pending_views(item(42)).await.unwrap(), 0);
        assert_eq!(deduper.all_pending_item_ids().await.unwrap(), vec![item(43)]);

        assert!(deduper.drain(item(42)).await.unwrap().is_empty());
        // New window after the drain.
        assert!(deduper.track(42, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_requeued_views_stay_apart_from_new_window() {
        let deduper = deduper();
        deduper.track(42, 1).await.unwrap();
        let drained = deduper.drain(item(42)).await.unwrap();

        assert!(deduper.track(42, 1).await.unwrap());
        deduper.requeue(item(42), &drained).await.unwrap();
        assert_eq!(deduper.pending_views(item(42)).await.unwrap(), 2);
        assert_eq!(deduper.all_pending_item_ids().await.unwrap(), vec![item(42)]);

        assert_eq!(
            deduper.drain_requeued(item(42)).await.unwrap(),
            vec![HashSet::from([user(1)])]
        );
        assert_eq!(
            deduper.drain(item(42)).await.unwrap(),
            HashSet::from([user(1)])
        );
        assert_eq!(deduper.pending_views(item(42)).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tracks_for_same_pair_accept_once() {
        let deduper = deduper();
        let handles: Vec<_> = (0..64)
            .map(|_| {
                let deduper = deduper.clone();
                tokio::spawn(async move { deduper.track(7, 9).await.unwrap() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(deduper.pending_views(item(7)).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_spans_drains() {
        let deduper = ViewDeduper::new(
            Arc::new(MemoryPendingStore::new()),
            Some(Duration::from_secs(15 * 60)),
        );

        assert!(deduper.track(5, 1).await.unwrap());
        deduper.drain(item(5)).await.unwrap();
        assert!(!deduper.track(5, 1).await.unwrap());

        tokio::time::advance(Duration::from_secs(15 * 60 + 1)).await;
        assert!(deduper.track(5, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_unavailable() {
        let store = Arc::new(OfflinePendingStore::new());
        let deduper = ViewDeduper::new(store.clone(), None);

        store.set_offline(true);
        assert!(matches!(
            deduper.track(1, 1).await,
            Err(ViewCountError::StoreUnavailable(_))
        ));

        store.set_offline(false);
        assert!(deduper.track(1, 1).await.unwrap());
    }
}
