// viewcount-tracker - Deduplicated view tracking with batched persistence
//
// Page-view handlers call ViewDeduper::track on the hot path; it only touches
// the pending-set store. A timer-driven ViewFlusher drains the pending sets and
// commits the aggregated counts to the durable CounterStore, re-queueing
// anything it fails to persist.

mod deduper;
mod flusher;
mod requeue;
mod summary;

pub use deduper::ViewDeduper;
pub use flusher::{FlushOptions, ViewFlusher};
pub use summary::FlushSummary;

pub use viewcount_core::{
    CounterStore, ItemId, MemoryCounterStore, MemoryPendingStore, PendingStore, Result, UserId,
    ViewCountError, ViewRecord,
};
