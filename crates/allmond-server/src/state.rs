use crate::config::ServiceConfig;
use allmond_sentiment::{ModelHandle, SentimentPipeline};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Inference over the model composed at startup
    pub pipeline: SentimentPipeline,

    /// Service configuration
    pub config: Arc<ServiceConfig>,

    /// Prometheus renderer; absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(handle: Arc<ModelHandle>, config: ServiceConfig) -> Self {
        Self {
            pipeline: SentimentPipeline::new(handle),
            config: Arc::new(config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn model(&self) -> &ModelHandle {
        self.pipeline.handle()
    }
}
