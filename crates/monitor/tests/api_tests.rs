//! Integration tests for the monitor API endpoints

use axum::{
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use async_trait::async_trait;
use monitor_lib::{
    health::components, Collector, ComponentStatus, ContainerSpec, CycleOutcome, HealthRegistry,
    MetricStore, MonitorMetrics, PodPhase, PodSpec, PodSpecSource, SnapshotQuery, SortKey,
    SpecSourceError, UsageSnapshot, UsageSource,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

struct StaticSpecSource {
    pods: Vec<PodSpec>,
}

#[async_trait]
impl PodSpecSource for StaticSpecSource {
    async fn fetch_pod_specs(&self) -> Result<Vec<PodSpec>, SpecSourceError> {
        Ok(self.pods.clone())
    }
}

struct StaticUsageSource {
    snapshot: UsageSnapshot,
}

#[async_trait]
impl UsageSource for StaticUsageSource {
    async fn fetch_usage(&self) -> UsageSnapshot {
        self.snapshot.clone()
    }
}

#[derive(Clone)]
struct AppState {
    store: MetricStore,
    collector: Arc<Collector>,
    health_registry: HealthRegistry,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health();
    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness();
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.collector.status())
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    namespace: Option<String>,
    search: Option<String>,
    sort: Option<String>,
    order: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

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

    let query = SnapshotQuery {
        namespace: params.namespace,
        search: params.search,
        sort,
        descending: params.order.as_deref() == Some("desc"),
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(20),
        ..SnapshotQuery::default()
    };

    Json(state.store.latest_snapshot(&query)).into_response()
}

async fn api_namespaces(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.namespaces())
}

async fn api_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.latest_summaries(None))
}

async fn api_collect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.collector.run_cycle().await {
        CycleOutcome::Completed { rows } => (
            StatusCode::OK,
            Json(json!({ "outcome": "completed", "rows": rows })),
        ),
        CycleOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(json!({ "outcome": "skipped" })),
        ),
        CycleOutcome::Failed(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "outcome": "failed", "error": e.to_string() })),
        ),
    }
}

fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/api/metrics", get(api_metrics))
        .route("/api/namespaces", get(api_namespaces))
        .route("/api/summary", get(api_summary))
        .route("/api/collect", post(api_collect))
        .with_state(state)
}

fn test_pods() -> Vec<PodSpec> {
    vec![
        PodSpec {
            namespace: "default".to_string(),
            name: "web-1".to_string(),
            node_name: Some("node-a".to_string()),
            phase: PodPhase::Running,
            containers: vec![ContainerSpec {
                name: "app".to_string(),
                image: Some("nginx:1.25".to_string()),
                cpu_request_cores: Some(0.25),
                memory_request_bytes: Some(128 * 1024 * 1024),
                cpu_limit_cores: Some(0.5),
                memory_limit_bytes: Some(256 * 1024 * 1024),
            }],
        },
        PodSpec {
            namespace: "prod".to_string(),
            name: "api-1".to_string(),
            node_name: Some("node-b".to_string()),
            phase: PodPhase::Running,
            containers: vec![ContainerSpec {
                name: "server".to_string(),
                image: Some("api:2.1".to_string()),
                cpu_request_cores: Some(1.0),
                memory_request_bytes: Some(512 * 1024 * 1024),
                cpu_limit_cores: None,
                memory_limit_bytes: None,
            }],
        },
    ]
}

fn setup_test_app() -> (Router, Arc<AppState>) {
    let mut snapshot = UsageSnapshot::default();
    snapshot.cpu_usage.insert("default/web-1".to_string(), 0.1);
    snapshot
        .memory_usage
        .insert("default/web-1".to_string(), 64 * 1024 * 1024);

    let store = MetricStore::new();
    let health_registry = HealthRegistry::new();

    let collector = Arc::new(Collector::new(
        Arc::new(StaticSpecSource { pods: test_pods() }),
        Arc::new(StaticUsageSource { snapshot }),
        store.clone(),
        health_registry.clone(),
        MonitorMetrics::new(),
        7 * 86_400_000,
    ));

    let state = Arc::new(AppState {
        store,
        collector,
        health_registry,
    });
    let router = create_test_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap();
    (status, value)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app();

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app();

    state
        .health_registry
        .set_unhealthy(components::SPEC_SOURCE, "cluster unreachable");

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_ready() {
    let (app, _state) = setup_test_app();

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app();

    state.health_registry.set_ready(true);

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_collect_then_query_snapshot() {
    let (app, state) = setup_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/collect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, page) = get_json(app, "/api/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 2);
    assert_eq!(page["rows"].as_array().unwrap().len(), 2);
    assert_eq!(state.store.row_count(), 2);
}

#[tokio::test]
async fn test_snapshot_namespace_filter_and_sort() {
    let (app, state) = setup_test_app();
    state.collector.run_cycle().await;

    let (status, page) = get_json(
        app,
        "/api/metrics?namespace=default&sort=cpu_usage&order=desc",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["rows"][0]["pod_name"], "web-1");
    // usage carried through from the metrics backend
    assert!((page["rows"][0]["cpu_usage_cores"].as_f64().unwrap() - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_snapshot_rejects_unknown_sort_key() {
    let (app, state) = setup_test_app();
    state.collector.run_cycle().await;

    let (status, body) = get_json(app, "/api/metrics?sort=nonsense").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("nonsense"));
}

#[tokio::test]
async fn test_namespaces_lists_latest_cycle() {
    let (app, state) = setup_test_app();
    state.collector.run_cycle().await;

    let (status, namespaces) = get_json(app, "/api/namespaces").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(namespaces, json!(["default", "prod"]));
}

#[tokio::test]
async fn test_summary_rolls_up_namespaces() {
    let (app, state) = setup_test_app();
    state.collector.run_cycle().await;

    let (status, summaries) = get_json(app, "/api/summary").await;

    assert_eq!(status, StatusCode::OK);
    let summaries = summaries.as_array().unwrap();
    assert_eq!(summaries.len(), 2);

    let prod = summaries
        .iter()
        .find(|s| s["namespace"] == "prod")
        .unwrap();
    assert_eq!(prod["total_pods"], 1);
    assert!((prod["total_cpu_requests"].as_f64().unwrap() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_status_reflects_cycles() {
    let (app, state) = setup_test_app();
    state.collector.run_cycle().await;

    let (status, body) = get_json(app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cycles_completed"], 1);
    assert_eq!(body["last_rows_stored"], 2);
    assert!(body["last_success_at"].is_i64());
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app();
    state.collector.run_cycle().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("monitor_cycles_completed_total"));
    assert!(metrics_text.contains("monitor_cycle_duration_seconds"));
}
