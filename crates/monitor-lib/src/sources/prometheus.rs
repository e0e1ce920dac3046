//! Pod usage collection from the Prometheus HTTP API
//!
//! Runs two instant queries per cycle, one for CPU and one for memory,
//! each already aggregated per pod server-side. The queries exclude the
//! pause container and other non-workload pseudo-containers.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::MonitorConfig;
use crate::error::UsageSourceError;
use crate::models::UsageSnapshot;
use crate::sources::UsageSource;

/// CPU rate over a trailing window, summed per (namespace, pod)
const CPU_USAGE_QUERY: &str = r#"sum(rate(container_cpu_usage_seconds_total{container!="POD",container!=""}[5m])) by (namespace, pod)"#;

/// Instantaneous working set, summed per (namespace, pod)
const MEMORY_USAGE_QUERY: &str = r#"sum(container_memory_working_set_bytes{container!="POD",container!=""}) by (namespace, pod)"#;

/// Usage source backed by a Prometheus-compatible metrics backend
pub struct PrometheusUsageSource {
    client: Client,
    query_url: Url,
}

impl PrometheusUsageSource {
    pub fn new(config: &MonitorConfig) -> Result<Self, UsageSourceError> {
        let client = Client::builder()
            .timeout(config.prometheus_timeout())
            .build()?;

        let base = Url::parse(&config.prometheus_url)?;
        let query_url = base.join("/api/v1/query")?;

        Ok(Self { client, query_url })
    }

    /// Run one instant query and return (namespace/pod, value) pairs.
    /// Series missing either label are skipped.
    async fn query(&self, promql: &str) -> Result<Vec<(String, f64)>, UsageSourceError> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", promql)])
            .send()
            .await?
            .error_for_status()?;

        let body: QueryResponse = response.json().await?;

        if body.status != "success" {
            return Err(UsageSourceError::Query(
                body.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let result = body.data.map(|d| d.result).unwrap_or_default();
        let mut values = Vec::with_capacity(result.len());

        for series in result {
            let namespace = series.metric.get("namespace");
            let pod = series.metric.get("pod");
            let (Some(namespace), Some(pod)) = (namespace, pod) else {
                continue;
            };
            if namespace.is_empty() || pod.is_empty() {
                continue;
            }

            let value: f64 = series
                .value
                .1
                .parse()
                .map_err(|_| UsageSourceError::Decode(format!("non-numeric sample {:?}", series.value.1)))?;

            values.push((format!("{namespace}/{pod}"), value));
        }

        Ok(values)
    }

    async fn pod_cpu_usage(&self) -> Result<HashMap<String, f64>, UsageSourceError> {
        let values = self.query(CPU_USAGE_QUERY).await?;
        debug!(pods = values.len(), "fetched CPU usage");
        Ok(values.into_iter().collect())
    }

    async fn pod_memory_usage(&self) -> Result<HashMap<String, u64>, UsageSourceError> {
        let values = self.query(MEMORY_USAGE_QUERY).await?;
        debug!(pods = values.len(), "fetched memory usage");
        Ok(values.into_iter().map(|(k, v)| (k, v as u64)).collect())
    }
}

#[async_trait]
impl UsageSource for PrometheusUsageSource {
    async fn fetch_usage(&self) -> UsageSnapshot {
        // The two queries run concurrently and fail independently.
        let (cpu, memory) = tokio::join!(self.pod_cpu_usage(), self.pod_memory_usage());

        let mut snapshot = UsageSnapshot::default();

        match cpu {
            Ok(usage) => snapshot.cpu_usage = usage,
            Err(e) => {
                warn!(error = %e, "CPU usage query failed, degrading to empty map");
                snapshot.cpu_error = Some(e.to_string());
            }
        }

        match memory {
            Ok(usage) => snapshot.memory_usage = usage,
            Err(e) => {
                warn!(error = %e, "memory usage query failed, degrading to empty map");
                snapshot.memory_error = Some(e.to_string());
            }
        }

        snapshot
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QuerySeries>,
}

#[derive(Debug, Deserialize)]
struct QuerySeries {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// Prometheus instant vectors are `[unix_seconds, "value"]`
    value: (f64, String),
}
