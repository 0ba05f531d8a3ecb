//! HTTP API for training, prediction, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use vmp_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    observability::PlacementMetrics,
    predictor::score_hosts,
    registry::RANDOM_FOREST,
    HostProfile, HostScoreWeights, PlacementEngine, PlacementError, PlacementRequest, VmDemand,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PlacementEngine>,
    pub health_registry: HealthRegistry,
    pub metrics: PlacementMetrics,
}

impl AppState {
    pub fn new(
        engine: Arc<PlacementEngine>,
        health_registry: HealthRegistry,
        metrics: PlacementMetrics,
    ) -> Self {
        Self {
            engine,
            health_registry,
            metrics,
        }
    }
}

/// Error body: `{"status": "error", "message": ...}`
#[derive(Debug)]
pub enum ApiError {
    Placement(PlacementError),
    BadRequest(String),
    Internal(String),
}

impl From<PlacementError> for ApiError {
    fn from(err: PlacementError) -> Self {
        ApiError::Placement(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Placement(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Placement(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        if status.is_server_error() {
            error!(message = %message, "Request failed");
        }
        (status, Json(json!({"status": "error", "message": message}))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Wrap a serializable payload as `{"status": "success", ...payload}`
fn success(payload: impl Serialize) -> ApiResult {
    let mut body = serde_json::to_value(payload).map_err(PlacementError::from)?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert("status".to_string(), json!("success"));
        }
        None => body = json!({"status": "success", "data": body}),
    }
    Ok(Json(body))
}

/// Run an engine call on the blocking pool
async fn run_blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&PlacementEngine) -> vmp_lib::Result<T> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    let outcome = tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?;
    Ok(outcome?)
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::Internal(format!("failed to encode metrics: {}", e)).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn api_health(State(state): State<Arc<AppState>>) -> ApiResult {
    success(json!({
        "message": "VM placement API is running",
        "models_initialized": state.engine.is_initialized(),
        "snapshot_version": state.engine.snapshot_version(),
    }))
}

async fn initialize(State(state): State<Arc<AppState>>) -> ApiResult {
    info!("Training all models");
    match run_blocking(&state, |engine| engine.initialize()).await {
        Ok(outcome) => {
            let registry = &state.health_registry;
            registry.set_healthy(components::DATASET).await;
            registry.set_healthy(components::PREDICTOR).await;
            if outcome.summary.failures.is_empty() {
                registry.set_healthy(components::TRAINER).await;
            } else {
                registry
                    .set_degraded(
                        components::TRAINER,
                        format!("{} models failed to fit", outcome.summary.failures.len()),
                    )
                    .await;
            }
            let mut body = serde_json::to_value(&outcome).map_err(PlacementError::from)?;
            body["message"] = json!("Models initialized successfully");
            success(body)
        }
        Err(ApiError::Placement(err)) => {
            let component = match &err {
                PlacementError::DataFormat(_) | PlacementError::Io(_) => components::DATASET,
                _ => components::TRAINER,
            };
            warn!(component = component, error = %err, "Training run failed");
            state
                .health_registry
                .set_degraded(component, err.to_string())
                .await;
            Err(ApiError::Placement(err))
        }
        Err(other) => Err(other),
    }
}

async fn results(State(state): State<Arc<AppState>>) -> ApiResult {
    let results = state.engine.results()?;
    success(json!({ "results": results }))
}

async fn performance(State(state): State<Arc<AppState>>) -> ApiResult {
    success(state.engine.performance()?)
}

#[derive(Debug, Deserialize)]
pub struct FeatureImportanceQuery {
    pub model: Option<String>,
}

async fn feature_importance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeatureImportanceQuery>,
) -> ApiResult {
    let model = query.model.unwrap_or_else(|| RANDOM_FOREST.to_string());
    let importance = state.engine.feature_importance(&model)?;
    success(json!({ "model": model, "feature_importance": importance }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload.map_err(|rejection| {
        state.metrics.inc_prediction_errors();
        ApiError::from(rejection)
    })?;
    let result = run_blocking(&state, move |engine| engine.predict(&request)).await?;
    success(result)
}

async fn hyperparameter_tuning(State(state): State<Arc<AppState>>) -> ApiResult {
    info!("Tuning hyperparameters");
    let outcome = run_blocking(&state, |engine| engine.tune()).await?;
    if outcome.failures.is_empty() {
        state.health_registry.set_healthy(components::TRAINER).await;
    } else {
        state
            .health_registry
            .set_degraded(
                components::TRAINER,
                format!("tuning failed for {} models", outcome.failures.len()),
            )
            .await;
    }
    let mut body = serde_json::to_value(&outcome).map_err(PlacementError::from)?;
    body["message"] = json!("Hyperparameter tuning completed");
    success(body)
}

async fn dataset_info(State(state): State<Arc<AppState>>) -> ApiResult {
    let info = run_blocking(&state, |engine| engine.dataset_info()).await?;
    success(json!({ "dataset_info": info }))
}

async fn vms(State(state): State<Arc<AppState>>) -> ApiResult {
    let vms = run_blocking(&state, |engine| engine.known_vms()).await?;
    success(json!({ "vms": vms }))
}

#[derive(Debug, Deserialize)]
pub struct ScoreHostsRequest {
    pub hosts: Vec<HostProfile>,
    pub vm: VmDemand,
    #[serde(default)]
    pub weights: HostScoreWeights,
}

async fn score_hosts_handler(
    payload: Result<Json<ScoreHostsRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let best = score_hosts(&request.hosts, &request.vm, &request.weights);
    success(json!({
        "best_host": best.as_ref().map(|h| h.host_id.as_str()),
        "score": best.as_ref().map(|h| h.score),
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/health", get(api_health))
        .route("/api/ml/initialize", post(initialize))
        .route("/api/ml/results", get(results))
        .route("/api/ml/performance", get(performance))
        .route("/api/ml/feature-importance", get(feature_importance))
        .route("/api/ml/predict", post(predict))
        .route("/api/ml/hyperparameter-tuning", post(hyperparameter_tuning))
        .route("/api/ml/dataset-info", get(dataset_info))
        .route("/api/ml/vms", get(vms))
        .route("/api/ml/score-hosts", post(score_hosts_handler))
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
