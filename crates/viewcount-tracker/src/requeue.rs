// Drain guard: drained views are either committed or handed back.
//
// A guard holds one batch per source: every batch re-queued by earlier failed
// flushes plus the freshly drained pending set. Batches stay separate so a
// user present in two of them is counted twice, once per window.
//
// The explicit paths are `committed` and `requeue`. If the flush future is
// dropped between drain and commit, Drop hands the batches to a spawned task
// that re-queues them, so cancellation follows the same path as a failed commit.

use std::collections::HashSet;

use tokio::runtime::Handle;
use tracing::{error, warn};
use viewcount_core::{ItemId, UserId};

use crate::deduper::ViewDeduper;

pub(crate) struct DrainedViews {
    item: ItemId,
    batches: Vec<HashSet<UserId>>,
    deduper: ViewDeduper,
    armed: bool,
}

impl DrainedViews {
    pub fn new(item: ItemId, deduper: ViewDeduper) -> Self {
        Self {
            item,
            batches: Vec::new(),
            deduper,
            armed: true,
        }
    }

    pub fn push(&mut self, users: HashSet<UserId>) {
        if !users.is_empty() {
            self.batches.push(users);
        }
    }

    pub fn extend(&mut self, batches: Vec<HashSet<UserId>>) {
        for users in batches {
            self.push(users);
        }
    }

    /// Views held across all batches.
    pub fn len(&self) -> usize {
        self.batches.iter().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Users appearing in any batch, each once.
    pub fn distinct_users(&self) -> HashSet<UserId> {
        self.batches.iter().flatten().copied().collect()
    }

    /// Durable commit succeeded; nothing to hand back.
    pub fn committed(mut self) -> u64 {
        self.armed = false;
        self.len() as u64
    }

    /// Durable commit failed; re-queue every batch for the next cycle.
    ///
    /// Returns the number of views that could not be re-queued and are lost.
    /// A batch leaves the guard only once its restore has returned, so a
    /// cancelled restore is retried from Drop.
    pub async fn requeue(mut self) -> u64 {
        let mut lost = 0;
        while let Some(users) = self.batches.last() {
            if let Err(e) = self.deduper.requeue(self.item, users).await {
                error!(
                    item = %self.item,
                    views = users.len(),
                    error = %e,
                    "Failed to re-queue drained views; they are lost"
                );
                lost += users.len() as u64;
            }
            self.batches.pop();
        }
        self.armed = false;
        lost
    }
}

impl Drop for DrainedViews {
    fn drop(&mut self) {
        if !self.armed || self.batches.is_empty() {
            return;
        }

        let item = self.item;
        let views = self.len();
        let batches = std::mem::take(&mut self.batches);
        let deduper = self.deduper.clone();
        match Handle::try_current() {
            Ok(handle) => {
                warn!(
                    item = %item,
                    views,
                    "Flush interrupted after drain, re-queueing views"
                );
                handle.spawn(async move {
                    for users in batches {
                        if let Err(e) = deduper.requeue(item, &users).await {
                            error!(
                                item = %item,
                                views = users.len(),
                                error = %e,
                                "Failed to re-queue views after interrupted flush"
                            );
                        }
                    }
                });
            }
            Err(_) => {
                error!(
                    item = %item,
                    views,
                    "Drained views dropped outside a runtime; cannot re-queue"
                );
            }
        }
    }
}
