//! Data sources for the collection pipeline
//!
//! Two independent, unreliable upstreams feed each cycle: the cluster
//! control plane for declared requests/limits and the metrics backend
//! for actual usage. Both sit behind traits so the collector can be
//! exercised without a cluster.

mod kube;
mod prometheus;

pub use kube::KubeSpecSource;
pub use prometheus::PrometheusUsageSource;

use crate::error::SpecSourceError;
use crate::models::{PodSpec, UsageSnapshot};

pub use async_trait::async_trait;

/// Source of declared pod/container resource specs
#[async_trait]
pub trait PodSpecSource: Send + Sync {
    /// Fetch the current set of running pods with normalized resource
    /// quantities, excluded namespaces already filtered out.
    ///
    /// Any failure is fatal for the cycle; partial results are never
    /// returned.
    async fn fetch_pod_specs(&self) -> Result<Vec<PodSpec>, SpecSourceError>;
}

/// Source of best-effort pod-level usage
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Fetch current CPU and memory usage per pod. This never fails:
    /// each metric degrades independently to an empty map, with the
    /// failure reason recorded on the snapshot.
    async fn fetch_usage(&self) -> UsageSnapshot;
}
