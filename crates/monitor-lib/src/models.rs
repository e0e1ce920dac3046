//! Core data models for the resource monitor

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Pod lifecycle phase as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse a phase string from the API server. Anything unrecognized
    /// maps to `Unknown` rather than failing the cycle.
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

/// Declared resources for one container, taken verbatim from the pod spec.
///
/// `None` means the field was not set on the container, which stays
/// distinguishable from an explicit zero request/limit all the way to storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: Option<String>,
    pub cpu_request_cores: Option<f64>,
    pub memory_request_bytes: Option<u64>,
    pub cpu_limit_cores: Option<f64>,
    pub memory_limit_bytes: Option<u64>,
}

/// Declared pod metadata and per-container resources from the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSpec {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    pub phase: PodPhase,
    pub containers: Vec<ContainerSpec>,
}

impl PodSpec {
    /// Composite key used to join spec data with pod-level usage data
    pub fn pod_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// One container's resource profile at one collection timestamp.
///
/// All rows produced in a cycle share the same `timestamp` (milliseconds
/// since epoch), so the latest complete snapshot is simply the row set at
/// `max(timestamp)`. Rows are immutable after insert and removed only by
/// the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceObservation {
    pub timestamp: i64,
    pub namespace: String,
    pub pod_name: String,
    pub container_name: Option<String>,
    pub node_name: Option<String>,
    pub pod_phase: PodPhase,
    pub cpu_request_cores: Option<f64>,
    pub memory_request_bytes: Option<u64>,
    pub cpu_limit_cores: Option<f64>,
    pub memory_limit_bytes: Option<u64>,
    /// Always present once computed; a pod missing from the usage maps
    /// records zero, never "not set".
    pub cpu_usage_cores: f64,
    pub memory_usage_bytes: u64,
}

impl ResourceObservation {
    /// True when all four request/limit fields are set and greater than zero
    pub fn is_complete(&self) -> bool {
        self.cpu_request_cores.is_some_and(|v| v > 0.0)
            && self.cpu_limit_cores.is_some_and(|v| v > 0.0)
            && self.memory_request_bytes.is_some_and(|v| v > 0)
            && self.memory_limit_bytes.is_some_and(|v| v > 0)
    }

    /// CPU usage as a fraction of the request. Rows without a positive
    /// request return -1.0 so they sort below any real ratio.
    pub fn cpu_usage_ratio(&self) -> f64 {
        match self.cpu_request_cores {
            Some(req) if req > 0.0 => self.cpu_usage_cores / req,
            _ => -1.0,
        }
    }

    /// Memory usage as a fraction of the request, with the same sentinel
    /// as [`cpu_usage_ratio`](Self::cpu_usage_ratio).
    pub fn memory_usage_ratio(&self) -> f64 {
        match self.memory_request_bytes {
            Some(req) if req > 0 => self.memory_usage_bytes as f64 / req as f64,
            _ => -1.0,
        }
    }
}

/// Namespace-level rollup written alongside the detail rows of a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub timestamp: i64,
    pub namespace: String,
    pub total_pods: u32,
    pub total_cpu_requests: f64,
    pub total_memory_requests: u64,
    pub total_cpu_limits: f64,
    pub total_memory_limits: u64,
    pub total_cpu_usage: f64,
    pub total_memory_usage: u64,
}

/// Best-effort pod-level usage from the metrics backend.
///
/// Each metric degrades independently to an empty map on query failure;
/// the failure reason is kept as a side channel for observability instead
/// of aborting the cycle.
#[derive(Debug, Clone, Default)]
pub struct UsageSnapshot {
    /// CPU cores by pod key (`namespace/pod`)
    pub cpu_usage: HashMap<String, f64>,
    /// Working-set bytes by pod key
    pub memory_usage: HashMap<String, u64>,
    pub cpu_error: Option<String>,
    pub memory_error: Option<String>,
}

impl UsageSnapshot {
    /// True if either metric query failed this cycle
    pub fn is_degraded(&self) -> bool {
        self.cpu_error.is_some() || self.memory_error.is_some()
    }

    /// CPU usage for a pod; missing pods read as zero, not "not set"
    pub fn cpu_for(&self, pod_key: &str) -> f64 {
        self.cpu_usage.get(pod_key).copied().unwrap_or(0.0)
    }

    /// Memory usage for a pod; missing pods read as zero
    pub fn memory_for(&self, pod_key: &str) -> u64 {
        self.memory_usage.get(pod_key).copied().unwrap_or(0)
    }
}
