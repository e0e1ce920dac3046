//! Kubernetes Resource Monitor
//!
//! Collects declared pod resources from the cluster control plane and
//! measured usage from Prometheus on a fixed schedule, stores the
//! joined observations with bounded retention, and serves them over a
//! small HTTP API.

use std::sync::Arc;

use anyhow::{Context, Result};
use monitor_lib::{
    Collector, HealthRegistry, KubeSpecSource, MetricStore, MonitorMetrics,
    PrometheusUsageSource, Scheduler,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = MONITOR_VERSION, "Starting kube-resource-monitor");

    let config = config::load()?;
    info!(
        interval_secs = config.collection_interval_secs,
        retention_days = config.retention_days,
        prometheus_url = %config.prometheus_url,
        "Monitor configured"
    );

    let spec_source = KubeSpecSource::connect(&config)
        .await
        .context("failed to connect to the Kubernetes API")?;
    let usage_source =
        PrometheusUsageSource::new(&config).context("failed to configure the Prometheus client")?;

    let store = MetricStore::new();
    let health_registry = HealthRegistry::new();
    let metrics = MonitorMetrics::new();

    let collector = Arc::new(Collector::new(
        Arc::new(spec_source),
        Arc::new(usage_source),
        store.clone(),
        health_registry.clone(),
        metrics,
        config.retention_millis(),
    ));

    let mut scheduler = Scheduler::new(Arc::clone(&collector), config.collection_interval());
    scheduler.start();

    let app_state = Arc::new(api::AppState::new(
        store,
        collector,
        health_registry.clone(),
        config.clone(),
    ));

    health_registry.set_ready(true);

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    health_registry.set_ready(false);
    scheduler.stop().await;
    api_handle.abort();

    Ok(())
}
