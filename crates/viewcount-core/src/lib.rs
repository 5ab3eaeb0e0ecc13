// viewcount-core - Shared types for the view-count pipeline
//
// Identifiers, the error taxonomy, and the two storage seams:
// - PendingStore: low-latency set store holding un-flushed viewers per item
// - CounterStore: durable store holding authoritative view totals
//
// In-memory implementations of both live in `memory`.

pub mod error;
pub mod ids;
pub mod memory;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{Result, ViewCountError};
pub use ids::{ItemId, UserId};
pub use memory::{MemoryCounterStore, MemoryPendingStore};
pub use store::{CounterStore, PendingStore, ViewRecord};
