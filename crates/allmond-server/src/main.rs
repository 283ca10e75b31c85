//! Allmond Server
//!
//! Serves three-way review sentiment from a DistilBERT base model composed
//! with an optional LoRA adapter at startup.

use allmond_sentiment::{compose, ModelHandle};
use allmond_server::{create_router, AppState, Cli, ServiceConfig};
use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    info!("Starting Allmond sentiment server");

    let config = ServiceConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded successfully");
    info!("Base model: {}", config.model.base_model);
    info!("Adapter path: {}", config.model.adapter_path.display());
    info!("Max batch size: {}", config.max_batch_size);

    let metrics_handle = init_metrics()?;

    let handle = load_model(&config).await;
    let state = AppState::new(Arc::new(handle), config.clone()).with_metrics(metrics_handle);

    let addr: SocketAddr = config.bind_address().parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Compose the model off the async runtime. Failure leaves the service up
/// but unhealthy.
async fn load_model(config: &ServiceConfig) -> ModelHandle {
    let composer_config = config.model.clone();
    let result = tokio::task::spawn_blocking(move || compose(&composer_config)).await;

    let reason = match result {
        Ok(Ok(handle)) => {
            metrics::gauge!("allmond_model_loaded").set(1.0);
            return handle;
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("Model composition task failed: {}", e),
    };

    error!("Model composition failed, serving as unavailable: {}", reason);
    metrics::gauge!("allmond_model_loaded").set(0.0);
    ModelHandle::unloaded(reason)
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("allmond=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("allmond=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "allmond_requests_total",
        "Total number of requests processed by route"
    );
    metrics::describe_counter!(
        "allmond_sentiment_items_total",
        "Total number of classified texts by sentiment"
    );
    metrics::describe_counter!(
        "allmond_sentiment_item_errors_total",
        "Texts that failed inference and were returned as Error"
    );
    metrics::describe_histogram!(
        "allmond_sentiment_item_latency_us",
        metrics::Unit::Microseconds,
        "Per-text inference latency in microseconds"
    );
    metrics::describe_histogram!(
        "allmond_request_latency_us",
        metrics::Unit::Microseconds,
        "Request latency in microseconds by route"
    );
    metrics::describe_gauge!("allmond_model_loaded", "1 when a model is loaded, 0 otherwise");
    metrics::describe_counter!("allmond_errors_total", "Total number of errors by type");

    info!("Metrics exporter initialized");
    Ok(handle)
}
