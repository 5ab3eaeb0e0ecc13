//! Flush orchestration for pending views.
//!
//! One cycle:
//! 1. Purge expired dedup marks
//! 2. Snapshot the items with pending viewers
//! 3. Drain each item (re-queued batches plus the pending set) and commit it
//!    under a per-item timeout
//! 4. Re-queue the drained set when the commit fails, times out, or is cancelled
//! 5. Summarise, log, and emit metrics

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};
use viewcount_core::{CounterStore, ItemId, Result, UserId, ViewCountError, ViewRecord};

use crate::deduper::ViewDeduper;
use crate::requeue::DrainedViews;
use crate::summary::FlushSummary;

#[derive(Debug, Clone)]
pub struct FlushOptions {
    pub item_timeout: Duration,
    pub record_views: bool,
    pub escalate_after_cycles: u32,
}

impl Default for FlushOptions {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(5),
            record_views: false,
            escalate_after_cycles: 3,
        }
    }
}

/// Moves pending views into the durable counter store.
pub struct ViewFlusher {
    deduper: ViewDeduper,
    counters: Arc<dyn CounterStore>,
    options: FlushOptions,
    consecutive_failed_cycles: AtomicU32,
}

impl ViewFlusher {
    pub fn new(deduper: ViewDeduper, counters: Arc<dyn CounterStore>, options: FlushOptions) -> Self {
        Self {
            deduper,
            counters,
            options,
            consecutive_failed_cycles: AtomicU32::new(0),
        }
    }

    pub fn deduper(&self) -> &ViewDeduper {
        &self.deduper
    }

    pub fn counters(&self) -> &Arc<dyn CounterStore> {
        &self.counters
    }

    /// Drain every pending item and commit it.
    ///
    /// Per-item failures are isolated and reported in the summary. The cycle
    /// only fails outright when the pending store cannot list its items.
    #[tracing::instrument(
        name = "viewcount.flush_cycle",
        skip(self),
        fields(
            items = tracing::field::Empty,
            items_failed = tracing::field::Empty,
        )
    )]
    pub async fn flush_cycle(&self) -> Result<FlushSummary> {
        let start = Instant::now();

        match self.deduper.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired dedup marks"),
            Err(e) => warn!(error = %e, "Failed to purge expired dedup marks"),
        }

        let items = self.deduper.all_pending_item_ids().await?;
        tracing::Span::current().record("items", items.len());

        let mut summary = FlushSummary::default();
        for item in items {
            self.flush_item(item, &mut summary).await;
        }

        self.finish_cycle(&mut summary);
        tracing::Span::current().record("items_failed", summary.items_failed);

        histogram!(
            "viewcount.flush.duration_ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        counter!("viewcount.flush.cycles", 1);
        counter!(
            "viewcount.flush.views_committed",
            summary.total_views_committed
        );
        counter!("viewcount.flush.items_failed", summary.items_failed as u64);
        if summary.views_lost > 0 {
            counter!("viewcount.flush.views_lost", summary.views_lost);
        }

        Ok(summary)
    }

    async fn flush_item(&self, item: ItemId, summary: &mut FlushSummary) {
        let mut drained = DrainedViews::new(item, self.deduper.clone());

        // Re-queued batches first: if the fresh take then fails they go back.
        let taken = match self.deduper.drain_requeued(item).await {
            Ok(batches) => {
                drained.extend(batches);
                self.deduper.drain(item).await
            }
            Err(e) => Err(e),
        };
        match taken {
            Ok(users) => drained.push(users),
            Err(e) => {
                warn!(item = %item, error = %e, "Failed to drain pending views");
                summary.record_failure(item);
                summary.record_lost(drained.requeue().await);
                return;
            }
        }
        if drained.is_empty() {
            return;
        }

        let views = drained.len() as u64;
        let users = drained.distinct_users();
        match self.commit_with_timeout(item, &users, views).await {
            Ok(new_total) => {
                let views = drained.committed();
                debug!(item = %item, views, new_total, "Committed pending views");
                summary.record_success(views);
            }
            Err(e) => {
                warn!(
                    item = %item,
                    views,
                    error = %e,
                    "Commit failed, re-queueing drained views"
                );
                summary.record_failure(item);
                summary.record_lost(drained.requeue().await);
            }
        }
    }

    async fn commit_with_timeout(
        &self,
        item: ItemId,
        users: &HashSet<UserId>,
        views: u64,
    ) -> Result<u64> {
        let timeout = self.options.item_timeout;
        match tokio::time::timeout(timeout, self.commit(item, users, views)).await {
            Ok(result) => result,
            Err(_) => Err(ViewCountError::CommitTimeout { item, timeout }),
        }
    }

    /// Records go first: they are idempotent, so a replay after a failed
    /// increment never duplicates history.
    async fn commit(&self, item: ItemId, users: &HashSet<UserId>, views: u64) -> Result<u64> {
        if self.options.record_views {
            let viewed_at = Utc::now();
            for user in users {
                let record = ViewRecord {
                    item_id: item,
                    user_id: *user,
                    viewed_at,
                };
                self.counters.record_view(&record).await?;
            }
        }

        self.counters.increment_views(item, views).await
    }

    fn finish_cycle(&self, summary: &mut FlushSummary) {
        if summary.is_clean() {
            self.consecutive_failed_cycles.store(0, Ordering::SeqCst);
            info!(
                items_flushed = summary.items_flushed,
                total_views_committed = summary.total_views_committed,
                items_failed = 0,
                "Flush cycle complete"
            );
            return;
        }

        let consecutive = self.consecutive_failed_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        summary.consecutive_failed_cycles = consecutive;

        if consecutive >= self.options.escalate_after_cycles {
            error!(
                items_flushed = summary.items_flushed,
                total_views_committed = summary.total_views_committed,
                items_failed = summary.items_failed,
                failed_items = ?summary.failed_items,
                views_lost = summary.views_lost,
                consecutive_cycles = consecutive,
                "Flush cycles keep failing; durable store needs attention"
            );
        } else {
            warn!(
                items_flushed = summary.items_flushed,
                total_views_committed = summary.total_views_committed,
                items_failed = summary.items_failed,
                failed_items = ?summary.failed_items,
                views_lost = summary.views_lost,
                consecutive_cycles = consecutive,
                "Flush cycle completed with failures"
            );
        }
    }

    pub fn consecutive_failed_cycles(&self) -> u32 {
        self.consecutive_failed_cycles.load(Ordering::SeqCst)
    }
}
