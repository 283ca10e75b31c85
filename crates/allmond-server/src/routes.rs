//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn, Instrument};

use crate::state::AppState;
use allmond_core::ClassificationResult;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit;

    Router::new()
        .route("/analyze", post(analyze))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Batch of review texts to classify
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub variant: String,
    pub device: Option<String>,
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Vec<ClassificationResult>>, AppError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("analyze", %request_id);
    handle_analyze(state, payload).instrument(span).await
}

async fn handle_analyze(
    state: AppState,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Vec<ClassificationResult>>, AppError> {
    metrics::counter!("allmond_requests_total", "route" => "analyze").increment(1);

    let Json(req) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    if !state.model().is_loaded() {
        warn!("Rejecting request: model not loaded");
        return Err(AppError::ServiceUnavailable(
            state
                .model()
                .failure_reason()
                .unwrap_or("model not loaded")
                .to_string(),
        ));
    }

    let max_batch_size = state.config.max_batch_size;
    if req.texts.len() > max_batch_size {
        return Err(AppError::InvalidRequest(format!(
            "Batch of {} texts exceeds the limit of {}",
            req.texts.len(),
            max_batch_size
        )));
    }

    debug!("Classifying {} texts", req.texts.len());
    let start = Instant::now();

    let pipeline = state.pipeline.clone();
    let texts = req.texts;
    let results = tokio::task::spawn_blocking(move || pipeline.analyze(&texts))
        .await
        .map_err(|e| AppError::InternalError(format!("Inference task failed: {}", e)))??;

    let errors = results.iter().filter(|r| r.is_error()).count();
    info!(
        "Classified {} texts ({} errors) in {:?}",
        results.len(),
        errors,
        start.elapsed()
    );
    metrics::histogram!("allmond_request_latency_us", "route" => "analyze")
        .record(start.elapsed().as_micros() as f64);

    Ok(Json(results))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let model = state.model();
    let model_loaded = model.is_loaded();

    let status = if model_loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if model_loaded { "ok" } else { "unavailable" }.to_string(),
        model_loaded,
        variant: model.variant().as_str().to_string(),
        device: model.device_kind().map(|d| d.to_string()),
    };

    (status, Json(body))
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<allmond_core::Error> for AppError {
    fn from(err: allmond_core::Error) -> Self {
        match err {
            allmond_core::Error::ServiceUnavailable(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::InternalError(_)) {
            error!("Request failed: {}", self);
        }

        let (status, message, kind) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg, "invalid_request_error"),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg, "service_unavailable")
            }
            AppError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "internal_error")
            }
        };

        metrics::counter!("allmond_errors_total", "type" => kind).increment(1);

        let body = json!({
            "error": {
                "message": message,
                "type": kind,
            }
        });

        (status, Json(body)).into_response()
    }
}
