//! Timer-driven flush loop.
//!
//! Stands in for the periodic task runner: a tokio task calls
//! `ViewFlusher::flush_cycle` on a fixed interval until shutdown, and
//! shutdown runs one last cycle so a clean stop loses no pending views.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use viewcount_tracker::{FlushSummary, ViewFlusher};

pub struct FlushScheduler;

const MIN_INTERVAL: Duration = Duration::from_millis(100);

impl FlushScheduler {
    /// Start flushing every `interval`. The first cycle runs one interval
    /// after spawning. A zero interval is raised to `MIN_INTERVAL`.
    pub fn spawn(flusher: Arc<ViewFlusher>, interval: Duration) -> FlushHandle {
        let interval = if interval < MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Flush interval too short, using {}ms",
                MIN_INTERVAL.as_millis()
            );
            MIN_INTERVAL
        } else {
            interval
        };

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(run_flush_loop(
            Arc::clone(&flusher),
            Arc::clone(&shutdown),
            interval,
        ));

        FlushHandle {
            flusher,
            shutdown,
            task,
        }
    }
}

/// Handle to a running flush loop.
pub struct FlushHandle {
    flusher: Arc<ViewFlusher>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the loop, wait for an in-flight cycle, then flush what is left.
    pub async fn shutdown(self) -> Result<FlushSummary> {
        self.shutdown.notify_one();
        self.task.await.context("Flush loop task panicked")?;

        let summary = self
            .flusher
            .flush_cycle()
            .await
            .context("Final flush cycle failed")?;
        info!(
            items_flushed = summary.items_flushed,
            total_views_committed = summary.total_views_committed,
            items_failed = summary.items_failed,
            "Flushed pending views before shutdown"
        );
        Ok(summary)
    }
}

async fn run_flush_loop(flusher: Arc<ViewFlusher>, shutdown: Arc<Notify>, interval: Duration) {
    debug!(
        "Background flush task started (interval={}s)",
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                if let Err(e) = flusher.flush_cycle().await {
                    warn!(error = %e, "Flush cycle failed, retrying next interval");
                }
            }
        }
    }

    debug!("Background flush task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewcount_tracker::{
        CounterStore, FlushOptions, ItemId, MemoryCounterStore, MemoryPendingStore, ViewDeduper,
    };

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_instead_of_panicking() {
        let counters = Arc::new(MemoryCounterStore::new());
        let deduper = ViewDeduper::new(Arc::new(MemoryPendingStore::new()), None);
        let flusher = Arc::new(ViewFlusher::new(
            deduper.clone(),
            counters.clone(),
            FlushOptions::default(),
        ));

        let handle = FlushScheduler::spawn(flusher, Duration::ZERO);
        deduper.track(1, 1).await.unwrap();
        tokio::time::sleep(MIN_INTERVAL * 2).await;
        assert_eq!(counters.total_views(ItemId::new(1).unwrap()).await.unwrap(), 1);

        assert_eq!(handle.shutdown().await.unwrap().total_views_committed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_flushes_on_interval_and_on_shutdown() {
        let counters = Arc::new(MemoryCounterStore::new());
        let deduper = ViewDeduper::new(Arc::new(MemoryPendingStore::new()), None);
        let flusher = Arc::new(ViewFlusher::new(
            deduper.clone(),
            counters.clone(),
            FlushOptions::default(),
        ));
        let item = ItemId::new(42).unwrap();

        let handle = FlushScheduler::spawn(flusher, Duration::from_secs(60));
        deduper.track(42, 1).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counters.total_views(item).await.unwrap(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counters.total_views(item).await.unwrap(), 1);

        deduper.track(42, 2).await.unwrap();
        let summary = handle.shutdown().await.unwrap();
        assert_eq!(summary.total_views_committed, 1);
        assert_eq!(counters.total_views(item).await.unwrap(), 2);
    }
}
