//! HTTP exposition for the exporter.
//!
//! Provides:
//! - `<metrics path>` - runs one speedtest and returns it in Prometheus format
//! - `/` - landing page
//! - `/health` - liveness check, never triggers a speedtest

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use crate::cycle::Exporter;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub exporter: Arc<Exporter>,
    pub metrics_path: String,
    pub version: &'static str,
}

pub fn create_router(state: HttpState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route(&metrics_path, get(metrics_handler))
        .with_state(Arc::new(state))
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match state.exporter.collect().await {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.exporter.catalog().content_type())],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn index_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let series: String = state
        .exporter
        .catalog()
        .descs()
        .iter()
        .map(|d| format!("<li><code>{}</code> - {}</li>\n", d.name, d.help))
        .collect();

    Html(format!(
        "<html>\n<head><title>Speedtest Exporter</title></head>\n<body>\n\
         <h1>Speedtest Exporter</h1>\n\
         <p>Every scrape runs a full speedtest, so keep the scrape interval long.</p>\n\
         <p><a href=\"{}\">Metrics</a></p>\n<ul>\n{}</ul>\n</body>\n</html>\n",
        state.metrics_path, series
    ))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "provider": state.exporter.provider().name(),
    }))
}

/// Serve until Ctrl-C. Scrapes already in progress are allowed to finish.
pub async fn serve(addr: SocketAddr, state: HttpState) -> std::io::Result<()> {
    let metrics_path = state.metrics_path.clone();
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Listening on {} (metrics at {})", addr, metrics_path);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
