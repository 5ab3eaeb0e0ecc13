//! Error types for the view-count pipeline

use crate::ids::ItemId;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while tracking or flushing views
#[derive(Debug, Error)]
pub enum ViewCountError {
    /// Malformed id handed to `track`; never retried
    #[error("invalid {field}: {value} (ids must be positive integers)")]
    InvalidArgument { field: &'static str, value: i64 },

    /// Pending-set store could not be reached
    #[error("pending view store unavailable: {0}")]
    StoreUnavailable(String),

    /// Durable store rejected the commit for an item
    #[error("failed to commit views for item {item}: {reason}")]
    CommitFailure { item: ItemId, reason: String },

    /// Durable commit did not finish within the per-item timeout
    #[error("commit for item {item} timed out after {}ms", timeout.as_millis())]
    CommitTimeout { item: ItemId, timeout: Duration },

    /// One or more items failed during a flush cycle
    #[error(
        "{} item(s) failed to commit; {consecutive_cycles} consecutive cycle(s) with failures",
        failed_items.len()
    )]
    PartialCycleFailure {
        failed_items: Vec<ItemId>,
        consecutive_cycles: u32,
    },
}

impl ViewCountError {
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable(reason.into())
    }

    pub fn commit_failure(item: ItemId, reason: impl Into<String>) -> Self {
        Self::CommitFailure {
            item,
            reason: reason.into(),
        }
    }

    /// Commit errors are recovered by re-queueing the drained set.
    pub fn is_commit_error(&self) -> bool {
        matches!(self, Self::CommitFailure { .. } | Self::CommitTimeout { .. })
    }
}

/// Result type alias for ViewCountError
pub type Result<T> = std::result::Result<T, ViewCountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let item = ItemId::new(42).unwrap();
        let err = ViewCountError::commit_failure(item, "connection reset");
        assert_eq!(
            err.to_string(),
            "failed to commit views for item 42: connection reset"
        );
        assert!(err.is_commit_error());

        let timeout = ViewCountError::CommitTimeout {
            item,
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            timeout.to_string(),
            "commit for item 42 timed out after 250ms"
        );
        assert!(timeout.is_commit_error());

        let partial = ViewCountError::PartialCycleFailure {
            failed_items: vec![item],
            consecutive_cycles: 2,
        };
        assert!(partial.to_string().starts_with("1 item(s) failed"));
        assert!(!ViewCountError::store_unavailable("down").is_commit_error());
    }
}
