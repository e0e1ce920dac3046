//! Embedded store for per-container observations
//!
//! Two tables keyed by cycle timestamp: detail observations and
//! namespace summaries. The collector is the only writer; HTTP readers
//! query concurrently at any time. Ordered maps keep latest-snapshot
//! lookup and time-range scans logarithmic as retention grows.

mod query;

pub use query::{ChartPoint, SnapshotPage, SnapshotQuery, SortKey, UsageStats};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{ResourceObservation, ResourceSummary};

/// Maximum rows removed per sweep batch before yielding the write lock
const DELETE_BATCH_SIZE: usize = 1000;

/// Pause between sweep batches so concurrent readers and the next
/// writer are never starved
const SWEEP_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Tables {
    observations: BTreeMap<i64, Vec<ResourceObservation>>,
    summaries: BTreeMap<i64, Vec<ResourceSummary>>,
}

/// Thread-safe store of collection cycles.
///
/// Clones share the same underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MetricStore {
    tables: Arc<RwLock<Tables>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit one complete collection cycle as a single atomic batch.
    ///
    /// Either every row becomes visible to readers at once or, on a
    /// rejected timestamp, nothing is written at all. Timestamps must
    /// be strictly newer than anything already stored.
    pub fn insert_cycle(
        &self,
        timestamp: i64,
        rows: Vec<ResourceObservation>,
        summaries: Vec<ResourceSummary>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if tables.observations.contains_key(&timestamp) {
            return Err(StoreError::DuplicateCycle { timestamp });
        }
        if let Some((&latest, _)) = tables.observations.iter().next_back() {
            if timestamp < latest {
                return Err(StoreError::NonMonotonicCycle { timestamp, latest });
            }
        }

        tables.observations.insert(timestamp, rows);
        if !summaries.is_empty() {
            tables.summaries.insert(timestamp, summaries);
        }

        Ok(())
    }

    /// Delete all rows older than `cutoff` (milliseconds since epoch).
    ///
    /// Works in bounded batches with a brief pause in between so the
    /// write lock is never held across the whole sweep. Idempotent:
    /// with no qualifying rows this is a no-op. Returns the number of
    /// observation rows deleted.
    pub async fn delete_older_than(&self, cutoff: i64) -> Result<u64, StoreError> {
        let mut deleted: u64 = 0;

        loop {
            let removed = self.delete_batch(cutoff);
            deleted += removed as u64;

            if removed < DELETE_BATCH_SIZE {
                break;
            }
            tokio::time::sleep(SWEEP_PAUSE).await;
        }

        // Summary rows are a handful per cycle; drop them in one pass.
        {
            let mut tables = self.tables.write();
            tables.summaries = tables.summaries.split_off(&cutoff);
        }

        if deleted > 0 {
            debug!(deleted, cutoff, "retention sweep removed old rows");
        }
        Ok(deleted)
    }

    /// Remove up to one batch of observation rows below the cutoff,
    /// oldest cycles first, under a single short write lock.
    fn delete_batch(&self, cutoff: i64) -> usize {
        let mut tables = self.tables.write();
        let mut removed = 0;

        while removed < DELETE_BATCH_SIZE {
            let Some((&oldest, rows)) = tables.observations.iter().next() else {
                break;
            };
            if oldest >= cutoff {
                break;
            }

            let budget = DELETE_BATCH_SIZE - removed;
            if rows.len() <= budget {
                removed += tables
                    .observations
                    .remove(&oldest)
                    .map_or(0, |rows| rows.len());
            } else {
                // Cycle larger than the remaining budget: shrink it and
                // let the next batch finish the job.
                if let Some(rows) = tables.observations.get_mut(&oldest) {
                    rows.truncate(rows.len() - budget);
                }
                removed += budget;
            }
        }

        removed
    }

    /// Timestamp of the most recent committed cycle
    pub fn latest_timestamp(&self) -> Option<i64> {
        let tables = self.tables.read();
        tables.observations.keys().next_back().copied()
    }

    /// Total observation rows currently stored
    pub fn row_count(&self) -> usize {
        let tables = self.tables.read();
        tables.observations.values().map(Vec::len).sum()
    }

    /// All rows of the latest cycle, unfiltered
    pub fn latest_rows(&self) -> Vec<ResourceObservation> {
        let tables = self.tables.read();
        tables
            .observations
            .iter()
            .next_back()
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    /// Distinct namespaces present in the latest cycle, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let tables = self.tables.read();
        let Some((_, rows)) = tables.observations.iter().next_back() else {
            return Vec::new();
        };
        let mut namespaces: Vec<String> = rows.iter().map(|r| r.namespace.clone()).collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Summaries of the latest cycle, optionally restricted to one namespace
    pub fn latest_summaries(&self, namespace: Option<&str>) -> Vec<ResourceSummary> {
        let tables = self.tables.read();
        let Some((_, summaries)) = tables.summaries.iter().next_back() else {
            return Vec::new();
        };
        summaries
            .iter()
            .filter(|s| namespace.map_or(true, |ns| s.namespace == ns))
            .cloned()
            .collect()
    }

    /// Rows for one pod across a time range, oldest first
    pub fn pod_range(
        &self,
        namespace: &str,
        pod_name: &str,
        start: i64,
        end: i64,
    ) -> Vec<ResourceObservation> {
        let tables = self.tables.read();
        tables
            .observations
            .range(start..=end)
            .flat_map(|(_, rows)| rows.iter())
            .filter(|r| r.namespace == namespace && r.pod_name == pod_name)
            .cloned()
            .collect()
    }

    /// Rows for one namespace across a time range, oldest first
    pub fn namespace_range(&self, namespace: &str, start: i64, end: i64) -> Vec<ResourceObservation> {
        let tables = self.tables.read();
        tables
            .observations
            .range(start..=end)
            .flat_map(|(_, rows)| rows.iter())
            .filter(|r| r.namespace == namespace)
            .cloned()
            .collect()
    }

    pub(crate) fn read_observations<T>(
        &self,
        f: impl FnOnce(&BTreeMap<i64, Vec<ResourceObservation>>) -> T,
    ) -> T {
        let tables = self.tables.read();
        f(&tables.observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PodPhase;

    fn row(timestamp: i64, namespace: &str, pod: &str, container: &str) -> ResourceObservation {
        ResourceObservation {
            timestamp,
            namespace: namespace.to_string(),
            pod_name: pod.to_string(),
            container_name: Some(container.to_string()),
            node_name: Some("node-1".to_string()),
            pod_phase: PodPhase::Running,
            cpu_request_cores: Some(0.1),
            memory_request_bytes: Some(1024),
            cpu_limit_cores: Some(0.2),
            memory_limit_bytes: Some(2048),
            cpu_usage_cores: 0.05,
            memory_usage_bytes: 512,
        }
    }

    fn cycle(timestamp: i64, count: usize) -> Vec<ResourceObservation> {
        (0..count)
            .map(|i| row(timestamp, "default", &format!("pod-{i}"), "app"))
            .collect()
    }

    #[test]
    fn insert_cycle_visible_all_at_once() {
        let store = MetricStore::new();
        store.insert_cycle(1000, cycle(1000, 3), vec![]).unwrap();

        assert_eq!(store.latest_timestamp(), Some(1000));
        assert_eq!(store.latest_rows().len(), 3);
        assert_eq!(store.row_count(), 3);
    }

    #[test]
    fn duplicate_timestamp_rejected_without_side_effects() {
        let store = MetricStore::new();
        store.insert_cycle(1000, cycle(1000, 2), vec![]).unwrap();

        let err = store.insert_cycle(1000, cycle(1000, 5), vec![]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCycle { timestamp: 1000 }));
        // original cycle untouched
        assert_eq!(store.row_count(), 2);
    }

    #[test]
    fn older_timestamp_rejected() {
        let store = MetricStore::new();
        store.insert_cycle(2000, cycle(2000, 1), vec![]).unwrap();

        let err = store.insert_cycle(1000, cycle(1000, 1), vec![]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::NonMonotonicCycle {
                timestamp: 1000,
                latest: 2000
            }
        ));
    }

    #[tokio::test]
    async fn retention_sweep_deletes_only_below_cutoff() {
        let store = MetricStore::new();
        store.insert_cycle(1000, cycle(1000, 2), vec![]).unwrap();
        store.insert_cycle(2000, cycle(2000, 2), vec![]).unwrap();
        store.insert_cycle(3000, cycle(3000, 2), vec![]).unwrap();

        let deleted = store.delete_older_than(2500).await.unwrap();

        assert_eq!(deleted, 4);
        assert_eq!(store.latest_timestamp(), Some(3000));
        assert_eq!(store.row_count(), 2);
    }

    #[tokio::test]
    async fn retention_sweep_is_idempotent() {
        let store = MetricStore::new();
        store.insert_cycle(1000, cycle(1000, 3), vec![]).unwrap();
        store.insert_cycle(5000, cycle(5000, 3), vec![]).unwrap();

        let first = store.delete_older_than(4000).await.unwrap();
        let second = store.delete_older_than(4000).await.unwrap();

        assert_eq!(first, 3);
        assert_eq!(second, 0);
        assert_eq!(store.row_count(), 3);
    }

    #[tokio::test]
    async fn retention_sweep_handles_cycles_larger_than_one_batch() {
        let store = MetricStore::new();
        store.insert_cycle(1000, cycle(1000, 2500), vec![]).unwrap();
        store.insert_cycle(2000, cycle(2000, 10), vec![]).unwrap();

        let deleted = store.delete_older_than(1500).await.unwrap();

        assert_eq!(deleted, 2500);
        assert_eq!(store.row_count(), 10);
    }

    #[tokio::test]
    async fn retention_sweep_drops_old_summaries() {
        let store = MetricStore::new();
        let summary = ResourceSummary {
            timestamp: 1000,
            namespace: "default".to_string(),
            total_pods: 2,
            total_cpu_requests: 0.2,
            total_memory_requests: 2048,
            total_cpu_limits: 0.4,
            total_memory_limits: 4096,
            total_cpu_usage: 0.1,
            total_memory_usage: 1024,
        };
        store.insert_cycle(1000, cycle(1000, 2), vec![summary]).unwrap();
        store.insert_cycle(2000, cycle(2000, 2), vec![]).unwrap();

        store.delete_older_than(1500).await.unwrap();

        assert!(store.latest_summaries(None).is_empty());
    }

    #[test]
    fn namespaces_come_from_latest_cycle_only() {
        let store = MetricStore::new();
        store
            .insert_cycle(1000, vec![row(1000, "old-ns", "p", "c")], vec![])
            .unwrap();
        store
            .insert_cycle(
                2000,
                vec![
                    row(2000, "prod", "p1", "c"),
                    row(2000, "default", "p2", "c"),
                    row(2000, "default", "p3", "c"),
                ],
                vec![],
            )
            .unwrap();

        assert_eq!(store.namespaces(), vec!["default", "prod"]);
    }

    #[test]
    fn pod_range_scans_across_cycles() {
        let store = MetricStore::new();
        for ts in [1000, 2000, 3000] {
            store
                .insert_cycle(
                    ts,
                    vec![row(ts, "default", "web-1", "app"), row(ts, "default", "web-2", "app")],
                    vec![],
                )
                .unwrap();
        }

        let rows = store.pod_range("default", "web-1", 1000, 2000);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.pod_name == "web-1"));
        assert_eq!(rows[0].timestamp, 1000);
        assert_eq!(rows[1].timestamp, 2000);
    }

    #[test]
    fn concurrent_readers_during_writes() {
        use std::thread;

        let store = MetricStore::new();
        store.insert_cycle(500, cycle(500, 50), vec![]).unwrap();

        let mut handles = vec![];
        for i in 0..4 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                store
                    .insert_cycle(1000 + i, cycle(1000 + i, 10), vec![])
                    .ok();
            }));
        }
        for _ in 0..4 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    // readers must never observe a partially-inserted cycle
                    let rows = store.latest_rows();
                    assert!(rows.len() == 50 || rows.len() == 10);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
