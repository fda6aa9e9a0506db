//! HTTP client for the forecaster's snapshot API
//!
//! Used by the scaler to fetch the latest forecast snapshot over
//! `GET /forecast/current`, surfacing the forecaster's staleness header so
//! the caller can apply its own fallback policy.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use url::Url;

use crate::storage::Snapshot;

/// Header the forecaster sets on stale snapshots.
pub const STALE_HEADER: &str = "X-Kedastral-Stale";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A snapshot plus whether the forecaster marked it stale.
#[derive(Debug, Clone)]
pub struct SnapshotResult {
    pub snapshot: Snapshot,
    pub stale: bool,
}

/// Client for the forecaster snapshot API. Safe for concurrent use.
#[derive(Debug, Clone)]
pub struct ForecasterClient {
    base_url: String,
    client: reqwest::Client,
}

impl ForecasterClient {
    /// Creates a client for the forecaster at `base_url` (scheme and host,
    /// e.g. `http://localhost:8081`) with a 5 second request timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Fetches the latest snapshot for a workload, along with the
    /// forecaster's staleness verdict.
    pub async fn get_snapshot(&self, workload: &str) -> Result<SnapshotResult> {
        if workload.is_empty() {
            bail!("workload cannot be empty");
        }

        let mut url = Url::parse(&self.base_url).context("invalid base URL")?;
        url.set_path("/forecast/current");
        url.query_pairs_mut().append_pair("workload", workload);

        let resp = self.client.get(url).send().await.context("request failed")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            bail!("snapshot not found for workload {workload:?}");
        }
        if !resp.status().is_success() {
            bail!("unexpected status code: {}", resp.status().as_u16());
        }

        let stale = resp
            .headers()
            .get(STALE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "true")
            .unwrap_or(false);

        let snapshot: Snapshot = resp.json().await.context("decode snapshot response")?;

        Ok(SnapshotResult { snapshot, stale })
    }
}

/// Whether a snapshot is older than `stale_after`, by its own timestamp.
/// Lets the scaler apply a threshold independent of the forecaster's.
pub fn is_stale(snapshot: &Snapshot, stale_after: Duration) -> bool {
    let age = Utc::now() - snapshot.generated_at;
    age > chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::{routing::get, Router};
    use chrono::Duration as ChronoDuration;

    fn snapshot_at(age: ChronoDuration) -> Snapshot {
        Snapshot {
            workload: "web".to_string(),
            metric: "rps".to_string(),
            generated_at: Utc::now() - age,
            step_seconds: 60,
            horizon_seconds: 300,
            values: vec![100.0, 120.0, 90.0, 80.0, 70.0],
            desired_replicas: vec![2, 3, 2, 2, 2],
        }
    }

    async fn spawn_forecaster(snapshot: Snapshot, mark_stale: bool) -> String {
        let app = Router::new().route(
            "/forecast/current",
            get(move || {
                let snapshot = snapshot.clone();
                async move {
                    let mut headers = HeaderMap::new();
                    if mark_stale {
                        let name: axum::http::HeaderName = STALE_HEADER.parse().unwrap();
                        headers.insert(name, "true".parse().unwrap());
                    }
                    (headers, axum::Json(snapshot))
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

    #[tokio::test]
    async fn fetches_and_decodes_snapshot() {
        let base = spawn_forecaster(snapshot_at(ChronoDuration::zero()), false).await;
        let client = ForecasterClient::new(base);

        let result = client.get_snapshot("web").await.unwrap();
        assert_eq!(result.snapshot.workload, "web");
        assert_eq!(result.snapshot.desired_replicas, vec![2, 3, 2, 2, 2]);
        assert!(!result.stale);
    }

    #[tokio::test]
    async fn surfaces_stale_header() {
        let base = spawn_forecaster(snapshot_at(ChronoDuration::minutes(30)), true).await;
        let client = ForecasterClient::new(base);

        let result = client.get_snapshot("web").await.unwrap();
        assert!(result.stale);
    }

    #[tokio::test]
    async fn not_found_is_an_error() {
        let app = Router::new().route(
            "/forecast/current",
            get(|| async { StatusCode::NOT_FOUND }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = ForecasterClient::new(format!("http://{addr}"));
        let err = client.get_snapshot("web").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn empty_workload_is_rejected_locally() {
        let client = ForecasterClient::new("http://localhost:1");
        assert!(client.get_snapshot("").await.is_err());
    }

    #[test]
    fn staleness_compares_generated_at_age() {
        let fresh = snapshot_at(ChronoDuration::seconds(10));
        let old = snapshot_at(ChronoDuration::seconds(120));
        assert!(!is_stale(&fresh, Duration::from_secs(60)));
        assert!(is_stale(&old, Duration::from_secs(60)));
    }
}
