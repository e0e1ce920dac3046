//! Prometheus metrics exposed by the monitor itself
//!
//! Covers the collection pipeline: cycle outcomes and duration, rows
//! written per cycle, total rows retained, and retention deletions.
//! Served by the binary at `/metrics`.

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;

/// Cycle durations span network fetches, so buckets run into tens of seconds
const CYCLE_DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once per process)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_failed: IntCounter,
    cycles_skipped: IntCounter,
    rows_stored_last_cycle: IntGauge,
    store_rows: IntGauge,
    retention_rows_deleted: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "monitor_cycle_duration_seconds",
                "Wall-clock duration of one collection cycle",
                CYCLE_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_completed: register_int_counter!(
                "monitor_cycles_completed_total",
                "Collection cycles that persisted their rows"
            )
            .expect("Failed to register cycles_completed_total"),

            cycles_failed: register_int_counter!(
                "monitor_cycles_failed_total",
                "Collection cycles aborted with no rows written"
            )
            .expect("Failed to register cycles_failed_total"),

            cycles_skipped: register_int_counter!(
                "monitor_cycles_skipped_total",
                "Scheduled triggers skipped because a cycle was still running"
            )
            .expect("Failed to register cycles_skipped_total"),

            rows_stored_last_cycle: register_int_gauge!(
                "monitor_rows_stored_last_cycle",
                "Observation rows written by the most recent successful cycle"
            )
            .expect("Failed to register rows_stored_last_cycle"),

            store_rows: register_int_gauge!(
                "monitor_store_rows",
                "Observation rows currently retained in the store"
            )
            .expect("Failed to register store_rows"),

            retention_rows_deleted: register_int_counter!(
                "monitor_retention_rows_deleted_total",
                "Observation rows removed by the retention sweep"
            )
            .expect("Failed to register retention_rows_deleted_total"),
        }
    }
}

/// Lightweight handle to the global monitor metrics.
/// Multiple clones share the same underlying registry.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    pub fn inc_cycles_completed(&self) {
        self.inner().cycles_completed.inc();
    }

    pub fn inc_cycles_failed(&self) {
        self.inner().cycles_failed.inc();
    }

    pub fn inc_cycles_skipped(&self) {
        self.inner().cycles_skipped.inc();
    }

    pub fn set_rows_stored_last_cycle(&self, rows: i64) {
        self.inner().rows_stored_last_cycle.set(rows);
    }

    pub fn set_store_rows(&self, rows: i64) {
        self.inner().store_rows.set(rows);
    }

    pub fn add_retention_rows_deleted(&self, rows: u64) {
        self.inner().retention_rows_deleted.inc_by(rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_handle_is_cloneable_and_shared() {
        let metrics = MonitorMetrics::new();
        let clone = metrics.clone();

        metrics.inc_cycles_completed();
        clone.inc_cycles_completed();
        metrics.observe_cycle_duration(1.2);
        metrics.set_store_rows(42);
        // No panic on repeated initialization
        let _again = MonitorMetrics::new();
    }
}
