//! Core library for the Kubernetes resource monitor
//!
//! Implements the collection pipeline: scheduled cycles fetch declared
//! pod resources from the cluster control plane and measured usage from
//! the metrics backend, join them into per-container observations, and
//! commit them atomically to an in-memory store with bounded retention.
//!
//! The binary crate wires these pieces to configuration and the HTTP
//! API; everything here is testable without a cluster.

pub mod collector;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod scheduler;
pub mod sources;
pub mod store;

pub use collector::{Collector, CollectorStatus, CycleOutcome};
pub use config::MonitorConfig;
pub use error::{CycleError, SpecSourceError, StoreError, UsageSourceError};
pub use health::{ComponentStatus, HealthRegistry};
pub use models::{
    ContainerSpec, PodPhase, PodSpec, ResourceObservation, ResourceSummary, UsageSnapshot,
};
pub use observability::MonitorMetrics;
pub use scheduler::Scheduler;
pub use sources::{KubeSpecSource, PodSpecSource, PrometheusUsageSource, UsageSource};
pub use store::{ChartPoint, MetricStore, SnapshotPage, SnapshotQuery, SortKey, UsageStats};
