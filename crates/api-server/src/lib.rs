//! REST API server for deepfake video analysis
//!
//! - `GET /health`: liveness probe
//! - `POST /upload`: multipart video upload, returns the analysis report
//! - `GET /processed/{request_id}/{filename}`: annotated frames and anomaly video

pub mod config;
pub mod error;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use deepfake_pipeline::DeepfakePipeline;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Pipeline shared by all requests; holds the loaded classifier
    pub pipeline: Arc<DeepfakePipeline>,
    pub config: Arc<ServerConfig>,
}

impl ApiState {
    #[must_use]
    pub fn new(pipeline: DeepfakePipeline, config: ServerConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload_video))
        .route("/processed/{request_id}/{filename}", get(get_artifact))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server and run until Ctrl-C
///
/// Creates the upload and artifact roots if they are missing.
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tokio::fs::create_dir_all(&state.config.upload_dir).await?;
    tokio::fs::create_dir_all(&state.config.processed_dir).await?;

    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, draining requests"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
