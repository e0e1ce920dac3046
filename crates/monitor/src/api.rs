//! HTTP API: health checks, Prometheus metrics, and read endpoints
//! over the observation store. Handlers are thin delegates; all query
//! logic lives in the library.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use monitor_lib::{
    Collector, ComponentStatus, CycleOutcome, HealthRegistry, MetricStore, MonitorConfig,
    PodPhase, SnapshotQuery, SortKey,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: MetricStore,
    pub collector: Arc<Collector>,
    pub health_registry: HealthRegistry,
    pub config: MonitorConfig,
}

impl AppState {
    pub fn new(
        store: MetricStore,
        collector: Arc<Collector>,
        health_registry: HealthRegistry,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            collector,
            health_registry,
            config,
        }
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health();

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness();

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Collector status as JSON
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.collector.status())
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    namespace: Option<String>,
    search: Option<String>,
    /// Comma-separated phase names
    phase: Option<String>,
    #[serde(default)]
    complete_only: bool,
    sort: Option<String>,
    order: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

/// Paginated latest snapshot
async fn api_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SnapshotParams>,
) -> impl IntoResponse {
    let sort = match params.sort.as_deref() {
        None => SortKey::default(),
        Some(key) => match SortKey::parse(key) {
            Some(sort) => sort,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("unknown sort key: {key}") })),
                )
                    .into_response();
            }
        },
    };

    let phases = params.phase.as_deref().map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PodPhase::parse)
            .collect::<Vec<_>>()
    });

    let query = SnapshotQuery {
        namespace: params.namespace,
        search: params.search,
        phases,
        complete_only: params.complete_only,
        sort,
        descending: params.order.as_deref() == Some("desc"),
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(state.config.page_size),
    };

    Json(state.store.latest_snapshot(&query)).into_response()
}

/// Namespaces present in the latest snapshot
async fn api_namespaces(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.namespaces())
}

#[derive(Debug, Deserialize)]
struct NamespaceParams {
    namespace: Option<String>,
}

/// Per-namespace resource rollups from the latest cycle
async fn api_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NamespaceParams>,
) -> impl IntoResponse {
    Json(state.store.latest_summaries(params.namespace.as_deref()))
}

/// Min/current/max usage per container across retained history
async fn api_usage_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NamespaceParams>,
) -> impl IntoResponse {
    Json(state.store.usage_stats(params.namespace.as_deref()))
}

#[derive(Debug, Deserialize)]
struct ChartParams {
    hours: Option<i64>,
}

/// Per-cycle average usage over a trailing window (default 24h)
async fn api_chart_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChartParams>,
) -> impl IntoResponse {
    let hours = params.hours.unwrap_or(24).clamp(1, 24 * 30);
    Json(state.store.chart_series(hours * 3_600_000))
}

/// Manual collection trigger. Coalesces with a running cycle instead of
/// queueing behind it.
async fn api_collect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.collector.run_cycle().await {
        CycleOutcome::Completed { rows } => (
            StatusCode::OK,
            Json(json!({ "outcome": "completed", "rows": rows })),
        ),
        CycleOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(json!({ "outcome": "skipped", "reason": "collection already in progress" })),
        ),
        CycleOutcome::Failed(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "outcome": "failed", "error": e.to_string() })),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/api/metrics", get(api_metrics))
        .route("/api/namespaces", get(api_namespaces))
        .route("/api/summary", get(api_summary))
        .route("/api/usage-stats", get(api_usage_stats))
        .route("/api/chart-data", get(api_chart_data))
        .route("/api/collect", post(api_collect))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
