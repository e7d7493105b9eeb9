//! HTTP server for bill extraction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::Request,
    routing::{get, post},
    Json, Router,
};
use medbill_core::ExtractionResponse;
use medbill_extract::{DocumentPipeline, ExtractionConfig, PageInput};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit: usize,
    pub extraction: ExtractionConfig,
}

/// Body of `POST /extract-bill-data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// Caller's name for the document, echoed into the logs.
    #[serde(default)]
    pub document: String,
    pub pages: Vec<PageInput>,
}

struct AppState {
    pipeline: DocumentPipeline,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router(pipeline: DocumentPipeline, body_limit: usize) -> Router {
    let state = Arc::new(AppState { pipeline });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        info_span!(
            "request",
            request_id = %uuid::Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/extract-bill-data", post(extract_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(trace)
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let pipeline = DocumentPipeline::new(config.extraction);
    let app = router(pipeline, config.body_limit);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid address {}:{}", config.host, config.port))?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /                  - Service banner");
    info!("  GET  /health            - Health check");
    info!("  POST /extract-bill-data - Line-item extraction");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "medbill extraction API is running",
        "endpoints": {
            "health": "GET /health",
            "extract": "POST /extract-bill-data",
        }
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn extract_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractRequest>,
) -> Json<ExtractionResponse> {
    info!(document = %request.document, pages = request.pages.len(), "Processing extraction request");
    let start = Instant::now();

    let response = state.pipeline.process_fragments(request.pages).await;

    info!(
        success = response.is_success,
        items = response.data.total_item_count,
        failed_pages = response.failed_pages.len(),
        total_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Extraction finished"
    );
    Json(response)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
