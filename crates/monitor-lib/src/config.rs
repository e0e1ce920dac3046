//! Monitor configuration
//!
//! One explicit struct built at startup and passed into the collector
//! and scheduler constructors. Values are immutable for the process
//! lifetime; there is no ambient global lookup.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// API server port for health/status endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// How many days of observations to retain
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Comma-separated namespaces excluded from collection
    #[serde(default = "default_excluded_namespaces")]
    pub excluded_namespaces: String,

    /// Prometheus base URL
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Prometheus query timeout in seconds
    #[serde(default = "default_prometheus_timeout")]
    pub prometheus_timeout_secs: u64,

    /// Pod list timeout in seconds
    #[serde(default = "default_kube_timeout")]
    pub kube_timeout_secs: u64,

    /// Default page size for snapshot queries
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_api_port() -> u16 {
    8080
}

fn default_collection_interval() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    7
}

fn default_excluded_namespaces() -> String {
    "kube-system,kube-public,kube-node-lease".to_string()
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_prometheus_timeout() -> u64 {
    30
}

fn default_kube_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    20
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            collection_interval_secs: default_collection_interval(),
            retention_days: default_retention_days(),
            excluded_namespaces: default_excluded_namespaces(),
            prometheus_url: default_prometheus_url(),
            prometheus_timeout_secs: default_prometheus_timeout(),
            kube_timeout_secs: default_kube_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl MonitorConfig {
    /// Excluded namespaces as a set, empty entries dropped
    pub fn excluded_namespace_set(&self) -> HashSet<String> {
        self.excluded_namespaces
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs)
    }

    /// Retention window in milliseconds, the store's timestamp unit
    pub fn retention_millis(&self) -> i64 {
        i64::from(self.retention_days) * 24 * 60 * 60 * 1000
    }

    pub fn prometheus_timeout(&self) -> Duration {
        Duration::from_secs(self.prometheus_timeout_secs)
    }

    pub fn kube_timeout(&self) -> Duration {
        Duration::from_secs(self.kube_timeout_secs)
    }
}
