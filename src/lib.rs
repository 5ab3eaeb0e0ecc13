// viewcount - Deduplicating view counter with batched persistence
//
// Assembles the pipeline from configuration:
// - ViewDeduper on the request path (pending-set store only)
// - ViewFlusher on a timer (drains pending sets into the counter store)
// - FlushScheduler driving the flusher until shutdown
//
// Stores are injected, so the same wiring runs against in-memory stores in
// tests and against external stores in production.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

mod init;
mod scheduler;

pub use init::init_tracing;
pub use scheduler::{FlushHandle, FlushScheduler};
pub use viewcount_config::{LogFormat, RuntimeConfig};
pub use viewcount_tracker::{
    CounterStore, FlushOptions, FlushSummary, ItemId, MemoryCounterStore, MemoryPendingStore,
    PendingStore, UserId, ViewCountError, ViewDeduper, ViewFlusher, ViewRecord,
};

/// Fully wired view counter.
#[derive(Clone)]
pub struct ViewCounter {
    deduper: ViewDeduper,
    flusher: Arc<ViewFlusher>,
    config: RuntimeConfig,
}

impl ViewCounter {
    /// Validates `config` before wiring; a hand-built config gets the same
    /// checks as a loaded one.
    pub fn new(
        config: RuntimeConfig,
        pending: Arc<dyn PendingStore>,
        counters: Arc<dyn CounterStore>,
    ) -> Result<Self> {
        config.validate().context("Invalid view counter configuration")?;

        let deduper = ViewDeduper::new(pending, config.dedup.window());
        let flusher = Arc::new(ViewFlusher::new(
            deduper.clone(),
            counters,
            init::flush_options(&config.flush),
        ));

        Ok(Self {
            deduper,
            flusher,
            config,
        })
    }

    /// Wire both stores in memory (single process, tests).
    pub fn in_memory(config: RuntimeConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryPendingStore::new()),
            Arc::new(MemoryCounterStore::new()),
        )
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn deduper(&self) -> &ViewDeduper {
        &self.deduper
    }

    pub fn flusher(&self) -> &Arc<ViewFlusher> {
        &self.flusher
    }

    /// Request-path entry point; see `ViewDeduper::track`.
    pub async fn track(&self, item_id: i64, user_id: i64) -> viewcount_tracker::Result<bool> {
        self.deduper.track(item_id, user_id).await
    }

    /// Durable total plus views still waiting for a flush.
    pub async fn views_including_pending(&self, item: ItemId) -> viewcount_tracker::Result<u64> {
        let durable = self.flusher.counters().total_views(item).await?;
        let pending = self.deduper.pending_views(item).await?;
        Ok(durable + pending as u64)
    }

    /// Start the periodic flush using `flush.interval_secs`.
    pub fn spawn_scheduler(&self) -> FlushHandle {
        FlushScheduler::spawn(Arc::clone(&self.flusher), self.config.flush.interval())
    }
}

/// Run the flush loop until Ctrl+C or SIGTERM, then flush once more.
pub async fn run_until_shutdown(counter: &ViewCounter) -> Result<FlushSummary> {
    info!(
        interval_secs = counter.config.flush.interval_secs,
        window_secs = ?counter.config.dedup.window_secs,
        record_views = counter.config.flush.record_views,
        "Starting view flush scheduler"
    );

    let handle = counter.spawn_scheduler();
    shutdown_signal().await;

    let summary = handle
        .shutdown()
        .await
        .context("Failed to stop flush scheduler")?;
    info!("View flush scheduler shutdown complete");
    Ok(summary)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
