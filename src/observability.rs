use std::net::SocketAddr;
use std::time::Instant;

use crate::auth::Operation;
use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: lifecycle operations. Labels: operation, outcome.
pub const OPERATIONS_TOTAL: &str = "slotbook_operations_total";

/// Histogram: lifecycle operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "slotbook_operation_duration_seconds";

// ── Background work ─────────────────────────────────────────────

/// Counter: bookings advanced by the status sweep. Labels: to.
pub const SWEEP_TRANSITIONS_TOTAL: &str = "slotbook_sweep_transitions_total";

/// Histogram: duration of one full status sweep in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "slotbook_sweep_duration_seconds";

/// Gauge: live bookings (all statuses).
pub const BOOKINGS_ACTIVE: &str = "slotbook_bookings_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record count and latency of one lifecycle operation.
pub fn record_operation<T>(op: Operation, result: &Result<T, EngineError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(OPERATIONS_TOTAL, "operation" => op.as_str(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => op.as_str())
        .record(started.elapsed().as_secs_f64());
}
