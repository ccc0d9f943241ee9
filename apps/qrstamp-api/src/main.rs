//! qrstamp API Server
//!
//! Finds sign markers such as `[[SIGN_HERE]]` in uploaded PDFs and stamps
//! QR codes over them. Provides endpoints for:
//!
//! - Marker detection
//! - QR stamping at caller-supplied positions
//! - Detection and stamping in one step

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use qrstamp_core::{Compositor, CompositorStyle};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod api;
mod config;
mod error;
mod models;
#[cfg(test)]
mod tests;

use config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub compositor: Arc<Compositor>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let style = CompositorStyle::with_label(config.certificate_label.clone());
        Self {
            config: Arc::new(config),
            compositor: Arc::new(Compositor::new(style)),
        }
    }
}

/// Build the router with all endpoints and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = state.config.cors_layer();
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        // Health check
        .route("/health", get(api::health))
        // Marker detection and stamping
        .route("/detect-sign-positions", post(api::detect_sign_positions))
        .route("/add-qr-codes", post(api::add_qr_codes))
        .route("/detect-and-add-qr", post(api::detect_and_add_qr))
        .route("/detect-with-regex", post(api::detect_with_regex))
        // Add middleware
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("qrstamp_api=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = ServerConfig::parse();
    if config.reload {
        warn!("RELOAD is set but hot reload is not supported; ignoring");
    }

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Starting qrstamp API on http://{}", listener.local_addr()?);
    info!(
        "Upload limit: {} bytes, CORS origins: {:?}",
        config.max_upload_bytes, config.allowed_origins
    );

    let app = build_router(AppState::new(config));
    axum::serve(listener, app).await?;

    Ok(())
}
