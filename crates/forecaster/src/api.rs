//! Forecaster HTTP API
//!
//! Routes:
//!   - `GET /forecast/current?workload=<name>` - latest forecast snapshot
//!   - `GET /healthz` - health check
//!   - `GET /metrics` - Prometheus metrics
//!
//! Snapshots older than the stale threshold carry an `X-Kedastral-Stale`
//! header; the transport stays successful and the caller decides what to do
//! with a stale read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use kedastral_core::client::STALE_HEADER;
use kedastral_core::observability::ForecasterMetrics;
use kedastral_core::storage::Store;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::{error, info};

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub stale_after: Duration,
    pub metrics: ForecasterMetrics,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, stale_after: Duration, metrics: ForecasterMetrics) -> Self {
        Self {
            store,
            stale_after,
            metrics,
        }
    }
}

/// Builds the forecaster router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/forecast/current", get(get_snapshot))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

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

async fn get_snapshot(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let workload = match params.get("workload").filter(|w| !w.is_empty()) {
        Some(workload) => workload,
        None => return error_response(StatusCode::BAD_REQUEST, "workload parameter required"),
    };

    let snapshot = match state.store.get_latest(workload).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &format!("snapshot not found for workload {workload:?}"),
            )
        }
        Err(e) => {
            error!(workload = %workload, error = %e, "failed to get snapshot");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    let age = (Utc::now() - snapshot.generated_at)
        .to_std()
        .unwrap_or_default();
    state.metrics.set_forecast_age(age.as_secs_f64());

    let mut headers = HeaderMap::new();
    if age > state.stale_after {
        let name: HeaderName = STALE_HEADER.parse().expect("valid header name");
        headers.insert(name, "true".parse().expect("valid header value"));
    }

    (StatusCode::OK, headers, Json(snapshot)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Serves the API until the shutdown channel fires, then drains in-flight
/// requests.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);
    info!(addr = %listener.local_addr()?, "starting forecaster API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
