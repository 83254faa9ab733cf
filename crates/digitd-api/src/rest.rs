//! REST API handlers

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use digitd_core::{ApiConfig, ModelArtifactMetadata, ModelSnapshot, ServeError};
use digitd_inference::{Dispatcher, ModelCache, ModelService};
use digitd_store::NewModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub service: ModelService,
    pub cache: Arc<ModelCache>,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/models", get(list_models))
        .route("/api/v1/models", post(register_model))
        .route("/api/v1/status", get(get_status))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

fn error_response(e: ServeError) -> (StatusCode, String) {
    let status = match e {
        ServeError::UnsupportedFormat(_) | ServeError::ImageDecode(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: state.cache.current().await.is_some(),
    })
}

/// Request to classify a drawing
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// `data:image/...;base64,...` payload
    pub image: String,
    /// Caller bookkeeping, echoed back
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Prediction response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub digit: u8,
    pub confidence: f32,
    pub using_model: bool,
    /// True when the fallback answer was served
    pub stub: bool,
    pub latency_ms: u64,
    pub model_id: Option<String>,
}

/// Classify a drawing; always answers 200
async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictRequest>,
) -> Json<PredictResponse> {
    let result = state
        .dispatcher
        .predict(&req.image, req.model_id.as_deref())
        .await;

    Json(PredictResponse {
        digit: result.digit,
        confidence: result.confidence,
        using_model: result.used_model,
        stub: !result.used_model,
        latency_ms: result.latency_ms,
        model_id: req.model_id,
    })
}

/// Model record as served over the API
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(flatten)]
    pub meta: ModelArtifactMetadata,
    /// Whether artifact bytes were stored with the record
    pub has_binary: bool,
}

impl From<ModelArtifactMetadata> for ModelResponse {
    fn from(meta: ModelArtifactMetadata) -> Self {
        Self {
            has_binary: meta.artifact.is_some(),
            meta,
        }
    }
}

/// List registered models
async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ModelResponse>>, (StatusCode, String)> {
    let models = state.service.list().await.map_err(error_response)?;
    Ok(Json(models.into_iter().map(ModelResponse::from).collect()))
}

/// Request to register a model
#[derive(Debug, Deserialize)]
pub struct RegisterModelRequest {
    pub algorithm: String,
    pub format: String,
    /// Omitted for metadata-only records
    #[serde(default)]
    pub artifact_base64: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

/// Register a model
async fn register_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterModelRequest>,
) -> Result<(StatusCode, Json<ModelResponse>), (StatusCode, String)> {
    let artifact = req
        .artifact_base64
        .as_deref()
        .map(|encoded| STANDARD.decode(encoded.trim()))
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid artifact_base64: {}", e)))?;

    debug!(
        algorithm = %req.algorithm,
        format = %req.format,
        size = ?artifact.as_ref().map(Vec::len),
        active = req.is_active,
        "Registering model"
    );

    let model = NewModel {
        name: req.name,
        algorithm: req.algorithm,
        format: req.format,
        artifact,
        make_active: req.is_active,
        metrics: req.metrics,
    };
    let meta = state.service.register(model).await.map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(ModelResponse::from(meta))))
}

/// System status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub registry: String,
    pub runtime: String,
    pub active_model_id: Option<Uuid>,
    pub cached_model: Option<ModelSnapshot>,
    pub loads: u64,
}

/// Get system status
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let active = state.service.active().await.map_err(error_response)?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        registry: state.service.registry_name().to_string(),
        runtime: state.cache.runtime_name().to_string(),
        active_model_id: active.map(|m| m.id),
        cached_model: state.cache.current().await,
        loads: state.cache.load_count(),
    }))
}
