//! Pod spec collection from the Kubernetes API server

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::info;

use crate::config::MonitorConfig;
use crate::error::SpecSourceError;
use crate::models::{ContainerSpec, PodPhase, PodSpec};
use crate::quantity::{parse_cpu, parse_memory, QuantityError};
use crate::sources::PodSpecSource;

/// Spec source backed by the cluster control plane.
///
/// Lists pods across all namespaces and drops the configured system
/// namespaces before returning, so excluded namespaces never reach
/// storage.
pub struct KubeSpecSource {
    pods: Api<Pod>,
    excluded_namespaces: HashSet<String>,
    timeout: Duration,
}

impl KubeSpecSource {
    /// Connect using in-cluster config or the local kubeconfig,
    /// whichever the environment provides.
    pub async fn connect(config: &MonitorConfig) -> Result<Self, SpecSourceError> {
        let client = Client::try_default()
            .await
            .map_err(|e| SpecSourceError::Client(e.to_string()))?;

        Ok(Self {
            pods: Api::all(client),
            excluded_namespaces: config.excluded_namespace_set(),
            timeout: config.kube_timeout(),
        })
    }
}

#[async_trait]
impl PodSpecSource for KubeSpecSource {
    async fn fetch_pod_specs(&self) -> Result<Vec<PodSpec>, SpecSourceError> {
        let list = tokio::time::timeout(self.timeout, self.pods.list(&ListParams::default()))
            .await
            .map_err(|_| SpecSourceError::Timeout(self.timeout))??;

        let specs = convert_pods(list.items, &self.excluded_namespaces)?;
        info!(pods = specs.len(), "retrieved pod specs from Kubernetes");
        Ok(specs)
    }
}

/// Convert API pods into normalized specs, skipping excluded namespaces
fn convert_pods(
    pods: Vec<Pod>,
    excluded_namespaces: &HashSet<String>,
) -> Result<Vec<PodSpec>, SpecSourceError> {
    let mut specs = Vec::with_capacity(pods.len());

    for pod in pods {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        if excluded_namespaces.contains(&namespace) {
            continue;
        }
        specs.push(convert_pod(pod, namespace)?);
    }

    Ok(specs)
}

fn convert_pod(pod: Pod, namespace: String) -> Result<PodSpec, SpecSourceError> {
    let name = pod.metadata.name.unwrap_or_default();
    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map_or(PodPhase::Unknown, PodPhase::parse);

    let mut node_name = None;
    let mut containers = Vec::new();

    if let Some(spec) = pod.spec {
        node_name = spec.node_name;

        for container in spec.containers {
            let resources = container.resources.as_ref();
            let requests = resources.and_then(|r| r.requests.as_ref());
            let limits = resources.and_then(|r| r.limits.as_ref());

            let (cpu_request_cores, memory_request_bytes) =
                resource_values(requests, &container.name)?;
            let (cpu_limit_cores, memory_limit_bytes) = resource_values(limits, &container.name)?;

            containers.push(ContainerSpec {
                name: container.name,
                image: container.image,
                cpu_request_cores,
                memory_request_bytes,
                cpu_limit_cores,
                memory_limit_bytes,
            });
        }
    }

    Ok(PodSpec {
        namespace,
        name,
        node_name,
        phase,
        containers,
    })
}

/// Extract normalized CPU/memory values from one requests or limits map.
///
/// An absent entry is `None`; an explicit `"0"` is `Some(0)`. The
/// distinction is preserved all the way to the stored row.
fn resource_values(
    quantities: Option<&BTreeMap<String, Quantity>>,
    container: &str,
) -> Result<(Option<f64>, Option<u64>), SpecSourceError> {
    let Some(quantities) = quantities else {
        return Ok((None, None));
    };

    let quantity_err = |source: QuantityError| SpecSourceError::Quantity {
        container: container.to_string(),
        source,
    };

    let cpu = quantities
        .get("cpu")
        .map(|q| parse_cpu(&q.0))
        .transpose()
        .map_err(quantity_err)?;
    let memory = quantities
        .get("memory")
        .map(|q| parse_memory(&q.0))
        .transpose()
        .map_err(quantity_err)?;

    Ok((cpu, memory))
}
