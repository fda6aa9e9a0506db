//! Integration tests for the external-scaler gRPC service
//!
//! Boots a mock forecaster HTTP endpoint and the real tonic server, then
//! exercises the wire methods through a gRPC client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tokio_stream::wrappers::TcpListenerStream;

use kedastral_core::client::ForecasterClient;
use kedastral_core::proto::externalscaler::{GetMetricsRequest, ScaledObjectRef};
use kedastral_core::proto::{ExternalScalerClient, ExternalScalerServer};
use kedastral_scaler::metrics::ScalerMetrics;
use kedastral_scaler::scaler::KedastralScaler;

const STALE_AFTER: Duration = Duration::from_secs(60);
const DEFAULT_MIN: i64 = 2;

/// Serves a fixed snapshot body for every workload.
async fn spawn_forecaster(age_secs: i64, desired: Vec<i64>) -> String {
    let app = Router::new().route(
        "/forecast/current",
        get(move || {
            let desired = desired.clone();
            async move {
                let values: Vec<f64> = desired.iter().map(|&r| r as f64 * 100.0).collect();
                Json(json!({
                    "workload": "web",
                    "metric": "rps",
                    "generatedAt": (Utc::now() - ChronoDuration::seconds(age_secs)).to_rfc3339(),
                    "stepSeconds": 60,
                    "horizonSeconds": 60 * desired.len() as u64,
                    "values": values,
                    "desiredReplicas": desired,
                }))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Serves a 404 for every workload.
async fn spawn_empty_forecaster() -> String {
    let app = Router::new().route(
        "/forecast/current",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "snapshot not found for workload \"web\""})),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Boots the scaler gRPC server against the given forecaster and returns a
/// connected client.
async fn spawn_scaler(forecaster_url: String, lead_secs: u64) -> ExternalScalerClient<tonic::transport::Channel> {
    let scaler = KedastralScaler::new(
        ForecasterClient::new(forecaster_url),
        Duration::from_secs(lead_secs),
        STALE_AFTER,
        DEFAULT_MIN,
        ScalerMetrics::new(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(ExternalScalerServer::new(scaler))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    ExternalScalerClient::connect(format!("http://{addr}"))
        .await
        .expect("connect to scaler")
}

fn reference(workload: &str) -> ScaledObjectRef {
    ScaledObjectRef {
        name: String::new(),
        namespace: "default".to_string(),
        scaler_metadata: HashMap::from([("workload".to_string(), workload.to_string())]),
    }
}

#[tokio::test]
async fn get_metrics_returns_lead_indexed_replicas() {
    // Lead 300s at 60s steps selects index 5.
    let forecaster = spawn_forecaster(0, vec![1, 2, 3, 4, 5, 8, 7]).await;
    let mut client = spawn_scaler(forecaster, 300).await;

    let response = client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(reference("web")),
            metric_name: String::new(),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.metric_values.len(), 1);
    assert_eq!(response.metric_values[0].metric_value, 8);
}

#[tokio::test]
async fn get_metrics_falls_back_on_stale_snapshot() {
    // Snapshot generated one second past the staleness threshold.
    let forecaster = spawn_forecaster(STALE_AFTER.as_secs() as i64 + 1, vec![8, 8, 8, 8, 8, 8]).await;
    let mut client = spawn_scaler(forecaster, 300).await;

    let response = client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(reference("web")),
            metric_name: String::new(),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.metric_values[0].metric_value, DEFAULT_MIN);
}

#[tokio::test]
async fn get_metrics_falls_back_on_missing_snapshot() {
    let forecaster = spawn_empty_forecaster().await;
    let mut client = spawn_scaler(forecaster, 300).await;

    let response = client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(reference("web")),
            metric_name: String::new(),
        })
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.metric_values[0].metric_value, DEFAULT_MIN);
}

#[tokio::test]
async fn get_metrics_without_workload_fails_not_found() {
    let forecaster = spawn_forecaster(0, vec![3]).await;
    let mut client = spawn_scaler(forecaster, 300).await;

    let status = client
        .get_metrics(GetMetricsRequest {
            scaled_object_ref: Some(ScaledObjectRef::default()),
            metric_name: String::new(),
        })
        .await
        .unwrap_err();

    assert_eq!(status.code(), tonic::Code::NotFound);
}

#[tokio::test]
async fn is_active_reflects_lead_indexed_plan() {
    let forecaster = spawn_forecaster(0, vec![0, 0, 0, 0, 0, 3]).await;
    let mut client = spawn_scaler(forecaster, 300).await;

    let response = client.is_active(reference("web")).await.unwrap().into_inner();
    assert!(response.result);
}

#[tokio::test]
async fn is_active_is_false_for_zero_plan() {
    let forecaster = spawn_forecaster(0, vec![0, 0, 0]).await;
    let mut client = spawn_scaler(forecaster, 0).await;

    let response = client.is_active(reference("web")).await.unwrap().into_inner();
    assert!(!response.result);
}

#[tokio::test]
async fn is_active_is_false_for_stale_snapshot() {
    let forecaster = spawn_forecaster(STALE_AFTER.as_secs() as i64 + 5, vec![9, 9, 9]).await;
    let mut client = spawn_scaler(forecaster, 0).await;

    let response = client.is_active(reference("web")).await.unwrap().into_inner();
    assert!(!response.result);
}

#[tokio::test]
async fn get_metric_spec_names_follow_workload() {
    let forecaster = spawn_forecaster(0, vec![1]).await;
    let mut client = spawn_scaler(forecaster, 300).await;

    let response = client
        .get_metric_spec(reference("web"))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.metric_specs.len(), 1);
    assert_eq!(
        response.metric_specs[0].metric_name,
        "kedastral-web-desired-replicas"
    );
    assert_eq!(response.metric_specs[0].target_size, 1);
}
