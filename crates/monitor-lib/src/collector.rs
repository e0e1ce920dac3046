//! Collection cycles: fetch, join, persist, clean up
//!
//! One cycle captures a single timestamp, fetches pod specs and usage
//! concurrently, joins them per container, commits the rows as one
//! atomic batch, and finishes with a retention sweep. Every failure is
//! converted to a [`CycleOutcome`] here; the scheduler never sees an
//! unhandled fault.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::CycleError;
use crate::health::{components, HealthRegistry};
use crate::models::{PodSpec, ResourceObservation, ResourceSummary, UsageSnapshot};
use crate::observability::MonitorMetrics;
use crate::sources::{PodSpecSource, UsageSource};
use crate::store::MetricStore;

/// Result of one collection trigger
#[derive(Debug)]
pub enum CycleOutcome {
    /// Rows were committed and the retention sweep ran
    Completed { rows: usize },
    /// The cycle aborted; nothing was written for its timestamp
    Failed(CycleError),
    /// Another cycle was still in flight; the trigger was coalesced away
    Skipped,
}

/// Inspectable collection state for the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStatus {
    pub last_success_at: Option<i64>,
    pub last_failure_at: Option<i64>,
    pub last_failure_reason: Option<String>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub last_rows_stored: usize,
}

/// Orchestrates collection cycles against the two sources and the store.
///
/// The collector is the store's sole writer.
pub struct Collector {
    spec_source: Arc<dyn PodSpecSource>,
    usage_source: Arc<dyn UsageSource>,
    store: MetricStore,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    retention_millis: i64,
    status: RwLock<CollectorStatus>,
    /// Guard implementing the at-most-one-cycle-in-flight policy
    cycle_guard: Mutex<()>,
}

impl Collector {
    pub fn new(
        spec_source: Arc<dyn PodSpecSource>,
        usage_source: Arc<dyn UsageSource>,
        store: MetricStore,
        health: HealthRegistry,
        metrics: MonitorMetrics,
        retention_millis: i64,
    ) -> Self {
        health.register(components::SPEC_SOURCE);
        health.register(components::USAGE_SOURCE);
        health.register(components::STORE);
        health.register(components::COLLECTOR);

        Self {
            spec_source,
            usage_source,
            store,
            health,
            metrics,
            retention_millis,
            status: RwLock::new(CollectorStatus::default()),
            cycle_guard: Mutex::new(()),
        }
    }

    pub fn status(&self) -> CollectorStatus {
        self.status.read().clone()
    }

    /// Run one collection cycle, or skip if one is already in flight.
    ///
    /// Never panics or propagates an error: the outcome carries the
    /// failure and the next trigger starts fresh.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            warn!("collection cycle already in flight, skipping trigger");
            self.status.write().cycles_skipped += 1;
            self.metrics.inc_cycles_skipped();
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        let result = self.collect_and_store().await;
        self.metrics
            .observe_cycle_duration(started.elapsed().as_secs_f64());

        match result {
            Ok(rows) => {
                let now = Utc::now().timestamp_millis();
                {
                    let mut status = self.status.write();
                    status.last_success_at = Some(now);
                    status.cycles_completed += 1;
                    status.last_rows_stored = rows;
                }
                self.metrics.inc_cycles_completed();
                self.metrics.set_rows_stored_last_cycle(rows as i64);
                self.metrics.set_store_rows(self.store.row_count() as i64);
                self.health.set_healthy(components::COLLECTOR);
                info!(
                    rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "collection cycle completed"
                );
                CycleOutcome::Completed { rows }
            }
            Err(e) => {
                error!(error = %e, "collection cycle failed");
                {
                    let mut status = self.status.write();
                    status.last_failure_at = Some(Utc::now().timestamp_millis());
                    status.last_failure_reason = Some(e.to_string());
                    status.cycles_failed += 1;
                }
                self.metrics.inc_cycles_failed();
                match &e {
                    CycleError::SpecSource(reason) => {
                        self.health
                            .set_unhealthy(components::SPEC_SOURCE, reason.to_string());
                    }
                    CycleError::Persistence(reason) => {
                        self.health.set_unhealthy(components::STORE, reason.to_string());
                    }
                }
                CycleOutcome::Failed(e)
            }
        }
    }

    async fn collect_and_store(&self) -> Result<usize, CycleError> {
        // One timestamp for every row in the cycle, so max(timestamp)
        // always selects a complete row set.
        let timestamp = Utc::now().timestamp_millis();

        let (specs, usage) = tokio::join!(
            self.spec_source.fetch_pod_specs(),
            self.usage_source.fetch_usage()
        );

        // Spec failure is fatal; usage failure only degrades.
        let specs = specs?;
        self.health.set_healthy(components::SPEC_SOURCE);

        if let Some(reason) = usage.cpu_error.as_deref().or(usage.memory_error.as_deref()) {
            self.health.set_degraded(components::USAGE_SOURCE, reason);
        } else {
            self.health.set_healthy(components::USAGE_SOURCE);
        }

        let (rows, summaries) = build_cycle(timestamp, &specs, &usage);
        let count = rows.len();

        self.store.insert_cycle(timestamp, rows, summaries)?;
        self.health.set_healthy(components::STORE);

        // The sweep runs after every successful commit. Its failure is
        // logged and retried next cycle; the rows above stay committed.
        let cutoff = timestamp - self.retention_millis;
        match self.store.delete_older_than(cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, "retention sweep removed old rows");
                }
                self.metrics.add_retention_rows_deleted(deleted);
            }
            Err(e) => {
                warn!(error = %e, "retention sweep failed, will retry next cycle");
            }
        }

        Ok(count)
    }
}

/// Join pod specs with usage into observation rows and namespace rollups.
///
/// Pod-level usage is distributed evenly across the pod's containers.
/// The usage queries aggregate per pod, so no per-container attribution
/// is available; the even split is a deliberate approximation. Pods with
/// no containers produce no rows.
fn build_cycle(
    timestamp: i64,
    specs: &[PodSpec],
    usage: &UsageSnapshot,
) -> (Vec<ResourceObservation>, Vec<ResourceSummary>) {
    let mut rows = Vec::new();
    let mut rollups: BTreeMap<String, ResourceSummary> = BTreeMap::new();

    for pod in specs {
        let container_count = pod.containers.len();
        if container_count == 0 {
            continue;
        }

        let pod_key = pod.pod_key();
        let cpu_share = usage.cpu_for(&pod_key) / container_count as f64;
        let memory_share = usage.memory_for(&pod_key) / container_count as u64;

        let rollup = rollups
            .entry(pod.namespace.clone())
            .or_insert_with(|| ResourceSummary {
                timestamp,
                namespace: pod.namespace.clone(),
                total_pods: 0,
                total_cpu_requests: 0.0,
                total_memory_requests: 0,
                total_cpu_limits: 0.0,
                total_memory_limits: 0,
                total_cpu_usage: 0.0,
                total_memory_usage: 0,
            });
        rollup.total_pods += 1;

        for container in &pod.containers {
            rollup.total_cpu_requests += container.cpu_request_cores.unwrap_or(0.0);
            rollup.total_memory_requests += container.memory_request_bytes.unwrap_or(0);
            rollup.total_cpu_limits += container.cpu_limit_cores.unwrap_or(0.0);
            rollup.total_memory_limits += container.memory_limit_bytes.unwrap_or(0);
            rollup.total_cpu_usage += cpu_share;
            rollup.total_memory_usage += memory_share;

            rows.push(ResourceObservation {
                timestamp,
                namespace: pod.namespace.clone(),
                pod_name: pod.name.clone(),
                container_name: Some(container.name.clone()),
                node_name: pod.node_name.clone(),
                pod_phase: pod.phase,
                cpu_request_cores: container.cpu_request_cores,
                memory_request_bytes: container.memory_request_bytes,
                cpu_limit_cores: container.cpu_limit_cores,
                memory_limit_bytes: container.memory_limit_bytes,
                cpu_usage_cores: cpu_share,
                memory_usage_bytes: memory_share,
            });
        }
    }

    (rows, rollups.into_values().collect())
}
