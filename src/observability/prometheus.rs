//! HTTP endpoint for metrics scraping.
//!
//! Provides:
//! - `/metrics` - Prometheus metrics endpoint
//! - `/lag` - JSON snapshot of every lag gauge
//! - `/health` - Basic health check
//! - `/ready` - Readiness check

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use crate::registry::GaugeRegistry;

/// Scrape server state.
#[derive(Clone)]
pub struct ScrapeState {
    registry: Arc<Registry>,
    gauges: Arc<GaugeRegistry>,
}

impl ScrapeState {
    /// Create scrape state over a Prometheus registry and the lag gauges.
    pub fn new(registry: Registry, gauges: Arc<GaugeRegistry>) -> Self {
        Self {
            registry: Arc::new(registry),
            gauges,
        }
    }
}

/// Create the scrape HTTP router.
pub fn create_router(state: ScrapeState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/lag", get(lag_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// Handle GET /metrics - Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<ScrapeState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

/// Handle GET /lag - current value of every gauge.
async fn lag_handler(State(state): State<ScrapeState>) -> impl IntoResponse {
    Json(state.gauges.snapshot())
}

/// Handle GET /health - Basic health check.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Handle GET /ready - Readiness check.
async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, "READY")
}

/// Run the scrape HTTP server until `shutdown_rx` fires.
pub async fn run_scrape_server(
    addr: SocketAddr,
    state: ScrapeState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Starting metrics server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("Metrics server shutting down");
        })
        .await?;

    Ok(())
}
