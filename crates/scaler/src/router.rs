//! Auxiliary HTTP server for the scaler
//!
//! Separate from the gRPC listener:
//!   - `GET /healthz` - health check (200 OK)
//!   - `GET /metrics` - Prometheus metrics

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use tracing::info;

async fn healthz() -> &'static str {
    "OK"
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
}

/// Serves health and metrics until the shutdown channel fires.
pub async fn serve(
    listener: tokio::net::TcpListener,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router();
    info!(addr = %listener.local_addr()?, "starting scaler HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
