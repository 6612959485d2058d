use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Periodically advance booking statuses by the engine's clock.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let now = engine.clock().now();
        match engine.sweep_statuses(now).await {
            Ok(report) if report.is_empty() => debug!("sweep: nothing to advance"),
            Ok(report) => info!(
                "sweep: {} started, {} completed",
                report.started, report.completed
            ),
            // The next tick retries; the sweep is idempotent.
            Err(e) => warn!("sweep failed: {e}"),
        }
    }
}

/// Periodically compact the WAL once enough appends have accumulated.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if threshold == 0 {
            continue;
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
