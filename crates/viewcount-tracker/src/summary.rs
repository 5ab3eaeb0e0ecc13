use serde::Serialize;
use viewcount_core::{ItemId, Result, ViewCountError};

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub items_flushed: usize,
    pub total_views_committed: u64,
    pub items_failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<ItemId>,
    /// Views that failed to commit and could not be re-queued either.
    #[serde(skip_serializing_if = "is_zero")]
    pub views_lost: u64,
    /// Cycles in a row (this one included) with at least one failed item.
    #[serde(skip)]
    pub consecutive_failed_cycles: u32,
}

impl FlushSummary {
    pub(crate) fn record_success(&mut self, views: u64) {
        self.items_flushed += 1;
        self.total_views_committed += views;
    }

    pub(crate) fn record_failure(&mut self, item: ItemId) {
        self.items_failed += 1;
        self.failed_items.push(item);
    }

    pub(crate) fn record_lost(&mut self, views: u64) {
        self.views_lost += views;
    }

    pub fn is_clean(&self) -> bool {
        self.items_failed == 0
    }

    /// Turn a partially failed cycle into `PartialCycleFailure`.
    pub fn ensure_complete(self) -> Result<Self> {
        if self.is_clean() {
            return Ok(self);
        }
        Err(ViewCountError::PartialCycleFailure {
            failed_items: self.failed_items,
            consecutive_cycles: self.consecutive_failed_cycles,
        })
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}
