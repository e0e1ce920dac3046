//! Read surface over stored observations
//!
//! Everything here is a read-only query issued concurrently with the
//! collector's writes: filtered/sorted/paginated views of the latest
//! snapshot, chart rollups, and min/current/max sizing statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::ResourceObservation;
use crate::store::MetricStore;

/// Sort keys for snapshot queries.
///
/// A fixed enumeration mapped to comparators; unknown keys are rejected
/// at the boundary by [`SortKey::parse`] instead of being ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    PodName,
    Namespace,
    CpuRequest,
    MemoryRequest,
    CpuLimit,
    MemoryLimit,
    CpuUsage,
    MemoryUsage,
    /// CPU usage divided by CPU request; rows without a request sort last
    CpuUsageRatio,
    /// Memory usage divided by memory request; rows without a request sort last
    MemoryUsageRatio,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pod_name" => Some(SortKey::PodName),
            "namespace" => Some(SortKey::Namespace),
            "cpu_request" => Some(SortKey::CpuRequest),
            "memory_request" => Some(SortKey::MemoryRequest),
            "cpu_limit" => Some(SortKey::CpuLimit),
            "memory_limit" => Some(SortKey::MemoryLimit),
            "cpu_usage" => Some(SortKey::CpuUsage),
            "memory_usage" => Some(SortKey::MemoryUsage),
            "cpu_usage_ratio" => Some(SortKey::CpuUsageRatio),
            "memory_usage_ratio" => Some(SortKey::MemoryUsageRatio),
            _ => None,
        }
    }

    fn compare(&self, a: &ResourceObservation, b: &ResourceObservation) -> std::cmp::Ordering {
        // Unset numeric fields sort below explicit zeros.
        let opt = |v: Option<f64>| v.unwrap_or(-1.0);
        let opt_bytes = |v: Option<u64>| v.map_or(-1.0, |b| b as f64);

        match self {
            SortKey::PodName => a.pod_name.cmp(&b.pod_name),
            SortKey::Namespace => a.namespace.cmp(&b.namespace),
            SortKey::CpuRequest => opt(a.cpu_request_cores).total_cmp(&opt(b.cpu_request_cores)),
            SortKey::MemoryRequest => {
                opt_bytes(a.memory_request_bytes).total_cmp(&opt_bytes(b.memory_request_bytes))
            }
            SortKey::CpuLimit => opt(a.cpu_limit_cores).total_cmp(&opt(b.cpu_limit_cores)),
            SortKey::MemoryLimit => {
                opt_bytes(a.memory_limit_bytes).total_cmp(&opt_bytes(b.memory_limit_bytes))
            }
            SortKey::CpuUsage => a.cpu_usage_cores.total_cmp(&b.cpu_usage_cores),
            SortKey::MemoryUsage => a.memory_usage_bytes.cmp(&b.memory_usage_bytes),
            SortKey::CpuUsageRatio => a.cpu_usage_ratio().total_cmp(&b.cpu_usage_ratio()),
            SortKey::MemoryUsageRatio => a.memory_usage_ratio().total_cmp(&b.memory_usage_ratio()),
        }
    }
}

/// Filter, sort, and pagination parameters for a latest-snapshot query
#[derive(Debug, Clone)]
pub struct SnapshotQuery {
    pub namespace: Option<String>,
    /// Pod name substring match
    pub search: Option<String>,
    pub phases: Option<Vec<crate::models::PodPhase>>,
    /// Keep only rows with all four request/limit fields set and positive
    pub complete_only: bool,
    pub sort: SortKey,
    pub descending: bool,
    /// 1-based page number
    pub page: usize,
    pub page_size: usize,
}

impl Default for SnapshotQuery {
    fn default() -> Self {
        Self {
            namespace: None,
            search: None,
            phases: None,
            complete_only: false,
            sort: SortKey::default(),
            descending: false,
            page: 1,
            page_size: 20,
        }
    }
}

/// One page of the latest snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotPage {
    pub rows: Vec<ResourceObservation>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Min/current/max usage for one container across retained history
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: Option<String>,
    pub cpu_min_cores: f64,
    pub cpu_current_cores: f64,
    pub cpu_max_cores: f64,
    pub memory_min_bytes: u64,
    pub memory_current_bytes: u64,
    pub memory_max_bytes: u64,
    pub samples: usize,
}

/// Average usage across all containers at one collection timestamp
#[derive(Debug, Clone, Serialize)]
pub struct ChartPoint {
    pub timestamp: i64,
    pub avg_cpu_cores: f64,
    pub avg_memory_mb: f64,
}

impl MetricStore {
    /// Query the latest snapshot: the complete, atomic row set at the
    /// maximum stored timestamp, filtered, sorted, and paginated.
    pub fn latest_snapshot(&self, query: &SnapshotQuery) -> SnapshotPage {
        let mut rows: Vec<ResourceObservation> = self
            .latest_rows()
            .into_iter()
            .filter(|r| matches_filters(r, query))
            .collect();

        rows.sort_by(|a, b| {
            let ordering = query.sort.compare(a, b);
            if query.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let total_count = rows.len();
        let page_size = query.page_size.max(1);
        let total_pages = total_count.div_ceil(page_size);
        let page = query.page.max(1);
        let offset = (page - 1) * page_size;

        let rows = rows.into_iter().skip(offset).take(page_size).collect();

        SnapshotPage {
            rows,
            total_count,
            page,
            page_size,
            total_pages,
        }
    }

    /// Min/current/max usage per (namespace, pod, container) across all
    /// retained history, for sizing display. "Current" is the value from
    /// each container's most recent observation.
    pub fn usage_stats(&self, namespace: Option<&str>) -> Vec<UsageStats> {
        self.read_observations(|observations| {
            let mut stats: BTreeMap<(String, String, Option<String>), UsageStats> = BTreeMap::new();

            // Cycles iterate oldest to newest, so the last write per key
            // is the current value.
            for rows in observations.values() {
                for row in rows {
                    if namespace.map_or(false, |ns| row.namespace != ns) {
                        continue;
                    }
                    let key = (
                        row.namespace.clone(),
                        row.pod_name.clone(),
                        row.container_name.clone(),
                    );
                    let entry = stats.entry(key).or_insert_with(|| UsageStats {
                        namespace: row.namespace.clone(),
                        pod_name: row.pod_name.clone(),
                        container_name: row.container_name.clone(),
                        cpu_min_cores: row.cpu_usage_cores,
                        cpu_current_cores: row.cpu_usage_cores,
                        cpu_max_cores: row.cpu_usage_cores,
                        memory_min_bytes: row.memory_usage_bytes,
                        memory_current_bytes: row.memory_usage_bytes,
                        memory_max_bytes: row.memory_usage_bytes,
                        samples: 0,
                    });

                    entry.cpu_min_cores = entry.cpu_min_cores.min(row.cpu_usage_cores);
                    entry.cpu_max_cores = entry.cpu_max_cores.max(row.cpu_usage_cores);
                    entry.cpu_current_cores = row.cpu_usage_cores;
                    entry.memory_min_bytes = entry.memory_min_bytes.min(row.memory_usage_bytes);
                    entry.memory_max_bytes = entry.memory_max_bytes.max(row.memory_usage_bytes);
                    entry.memory_current_bytes = row.memory_usage_bytes;
                    entry.samples += 1;
                }
            }

            stats.into_values().collect()
        })
    }

    /// Per-cycle average CPU/memory over the trailing window, for charts
    pub fn chart_series(&self, window_millis: i64) -> Vec<ChartPoint> {
        let Some(latest) = self.latest_timestamp() else {
            return Vec::new();
        };
        let start = latest - window_millis;

        self.read_observations(|observations| {
            observations
                .range(start..=latest)
                .filter(|(_, rows)| !rows.is_empty())
                .map(|(&timestamp, rows)| {
                    let n = rows.len() as f64;
                    let total_cpu: f64 = rows.iter().map(|r| r.cpu_usage_cores).sum();
                    let total_memory: f64 =
                        rows.iter().map(|r| r.memory_usage_bytes as f64).sum();
                    ChartPoint {
                        timestamp,
                        avg_cpu_cores: total_cpu / n,
                        avg_memory_mb: total_memory / n / (1024.0 * 1024.0),
                    }
                })
                .collect()
        })
    }
}

fn matches_filters(row: &ResourceObservation, query: &SnapshotQuery) -> bool {
    if let Some(ns) = &query.namespace {
        if &row.namespace != ns {
            return false;
        }
    }
    if let Some(search) = &query.search {
        if !row.pod_name.contains(search.as_str()) {
            return false;
        }
    }
    if let Some(phases) = &query.phases {
        if !phases.contains(&row.pod_phase) {
            return false;
        }
    }
    if query.complete_only && !row.is_complete() {
        return false;
    }
    true
}
