use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;
use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: events admitted into the scheduler.
pub const EVENTS_ADMITTED_TOTAL: &str = "hotelplan_events_admitted_total";

/// Counter: admission attempts rejected. Labels: reason.
pub const EVENTS_REJECTED_TOTAL: &str = "hotelplan_events_rejected_total";

/// Counter: events removed by name.
pub const EVENTS_REMOVED_TOTAL: &str = "hotelplan_events_removed_total";

/// Histogram: candidate windows tried per slot search.
pub const SLOT_SEARCH_STEPS: &str = "hotelplan_slot_search_steps";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: events currently admitted.
pub const EVENTS_ACTIVE: &str = "hotelplan_events_active";

/// Histogram: snapshot write (temp file + fsync + rename) duration in seconds.
pub const SNAPSHOT_SAVE_DURATION: &str = "hotelplan_snapshot_save_duration_seconds";

/// Histogram: snapshot read + parse duration in seconds.
pub const SNAPSHOT_LOAD_DURATION: &str = "hotelplan_snapshot_load_duration_seconds";

/// Counter: snapshot saves/loads that failed. Labels: op.
pub const SNAPSHOT_FAILURES_TOTAL: &str = "hotelplan_snapshot_failures_total";

/// Counter: autosave runs that wrote a snapshot.
pub const AUTOSAVES_TOTAL: &str = "hotelplan_autosaves_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install a fmt subscriber filtered by `RUST_LOG`. Does nothing if a global
/// subscriber is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
