//! HTTP surface tests against an in-process router

use allmond_core::ModelVariant;
use allmond_sentiment::loaders::load_tokenizer;
use allmond_sentiment::{ModelHandle, SequenceClassifier};
use allmond_server::{create_router, AppState, ServiceConfig};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use candle_core::{Device, Tensor};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Negative when the text contains "bad", Positive otherwise
struct FixedClassifier {
    bad_id: i64,
}

impl SequenceClassifier for FixedClassifier {
    fn forward(&self, input_ids: &Tensor, _padding_mask: &Tensor) -> candle_core::Result<Tensor> {
        let ids: Vec<Vec<i64>> = input_ids.to_vec2()?;
        let mut logits = Vec::with_capacity(ids.len() * 3);
        for row in &ids {
            if row.contains(&self.bad_id) {
                logits.extend_from_slice(&[3.0f32, 0.0, 0.0]);
            } else {
                logits.extend_from_slice(&[0.0f32, 0.0, 3.0]);
            }
        }
        Tensor::from_vec(logits, (ids.len(), 3), input_ids.device())
    }

    fn num_labels(&self) -> usize {
        3
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn loaded_handle() -> ModelHandle {
    let dir = tempfile::tempdir().unwrap();
    let vocab = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "great", "bad", "phone"];
    std::fs::write(dir.path().join("vocab.txt"), vocab.join("\n")).unwrap();
    let tokenizer = load_tokenizer(dir.path(), 32).unwrap();

    ModelHandle::new(
        tokenizer,
        Box::new(FixedClassifier { bad_id: 5 }),
        Device::Cpu,
        ModelVariant::BaseOnly,
    )
    .unwrap()
}

fn router(handle: ModelHandle, config: ServiceConfig) -> Router {
    create_router(AppState::new(Arc::new(handle), config))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn analyze_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn health_request() -> Request<Body> {
    Request::builder().uri("/health").body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_when_loaded() {
    let app = router(loaded_handle(), ServiceConfig::default());
    let (status, body) = send(app, health_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["variant"], "base_only");
    assert_eq!(body["device"], "cpu");
}

#[tokio::test]
async fn test_health_when_unloaded() {
    let app = router(ModelHandle::unloaded("weights missing"), ServiceConfig::default());
    let (status, body) = send(app, health_request()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["variant"], "unloaded");
    assert_eq!(body["device"], Value::Null);
}

#[tokio::test]
async fn test_analyze_returns_ordered_results() {
    let app = router(loaded_handle(), ServiceConfig::default());
    let request = analyze_request(json!({ "texts": ["great phone", "", "bad phone"] }));
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);

    assert_eq!(results[0]["text"], "great phone");
    assert_eq!(results[0]["sentiment"], "Positive");
    assert_eq!(results[1]["text"], "");
    assert_eq!(results[2]["text"], "bad phone");
    assert_eq!(results[2]["sentiment"], "Negative");

    for result in results {
        let confidence = result["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }
}

#[tokio::test]
async fn test_analyze_when_unloaded() {
    let app = router(ModelHandle::unloaded("weights missing"), ServiceConfig::default());
    let (status, body) = send(app, analyze_request(json!({ "texts": ["great phone"] }))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["type"], "service_unavailable");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("weights missing"));
}

#[tokio::test]
async fn test_analyze_rejects_oversized_batch() {
    let config = ServiceConfig {
        max_batch_size: 2,
        ..Default::default()
    };
    let app = router(loaded_handle(), config);
    let request = analyze_request(json!({ "texts": ["great", "bad", "phone"] }));
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_analyze_rejects_malformed_body() {
    let app = router(loaded_handle(), ServiceConfig::default());
    let (status, body) = send(app, analyze_request(json!({ "reviews": ["great"] }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_empty_batch_is_ok() {
    let app = router(loaded_handle(), ServiceConfig::default());
    let (status, body) = send(app, analyze_request(json!({ "texts": [] }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let state = AppState::new(Arc::new(loaded_handle()), ServiceConfig::default())
        .with_metrics(recorder.handle());
    let app = create_router(state);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_unknown_route() {
    let app = router(loaded_handle(), ServiceConfig::default());
    let request = Request::builder().uri("/predict").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
