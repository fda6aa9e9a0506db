//! External-scaler gRPC service
//!
//! Serves the three wire methods the host autoscaler polls. The scaler keeps
//! no mutable state beyond metrics: every answer is derived from the latest
//! forecaster snapshot, selected at the lead-time index. Any failure path in
//! `GetMetrics` (missing snapshot, stale snapshot, fetch error, invalid step)
//! returns the configured minimum instead of a wire error, so a forecaster
//! outage degrades to a safe default rather than destabilising the host
//! autoscaler.

use std::time::{Duration, Instant};

use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use kedastral_core::client::{is_stale, ForecasterClient, SnapshotResult};
use kedastral_core::proto::externalscaler::{
    GetMetricSpecResponse, GetMetricsRequest, GetMetricsResponse, IsActiveResponse, MetricSpec,
    MetricValue, ScaledObjectRef,
};
use kedastral_core::proto::ExternalScaler;
use kedastral_core::storage::Snapshot;

use crate::metrics::ScalerMetrics;

pub struct KedastralScaler {
    client: ForecasterClient,
    lead_time: Duration,
    stale_after: Duration,
    default_min: i64,
    metrics: ScalerMetrics,
}

impl KedastralScaler {
    pub fn new(
        client: ForecasterClient,
        lead_time: Duration,
        stale_after: Duration,
        default_min: i64,
        metrics: ScalerMetrics,
    ) -> Self {
        Self {
            client,
            lead_time,
            stale_after,
            default_min,
            metrics,
        }
    }

    /// The workload a scaled-object reference points at: the `workload`
    /// metadata key, falling back to the object name.
    fn resolve_workload(reference: &ScaledObjectRef) -> Option<String> {
        reference
            .scaler_metadata
            .get("workload")
            .filter(|w| !w.is_empty())
            .cloned()
            .or_else(|| {
                if reference.name.is_empty() {
                    None
                } else {
                    Some(reference.name.clone())
                }
            })
    }

    /// Deterministic metric name for a workload, unless overridden via the
    /// `metricName` metadata key.
    fn metric_name(reference: &ScaledObjectRef, workload: &str) -> String {
        reference
            .scaler_metadata
            .get("metricName")
            .filter(|m| !m.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("kedastral-{workload}-desired-replicas"))
    }

    /// The replica value at the lead-time index, saturating at the last
    /// forecast point. `None` when the snapshot cannot be indexed.
    fn replicas_at_lead(&self, snapshot: &Snapshot) -> Option<i64> {
        if snapshot.step_seconds == 0 || snapshot.desired_replicas.is_empty() {
            return None;
        }
        let lead_steps = (self.lead_time.as_secs() / snapshot.step_seconds) as usize;
        let index = lead_steps.min(snapshot.desired_replicas.len() - 1);
        Some(snapshot.desired_replicas[index])
    }

    async fn fetch(&self, workload: &str) -> Option<SnapshotResult> {
        let start = Instant::now();
        let result = self.client.get_snapshot(workload).await;
        self.metrics
            .observe_forecast_fetch(start.elapsed().as_secs_f64());

        match result {
            Ok(result) => {
                let age = chrono::Utc::now() - result.snapshot.generated_at;
                self.metrics
                    .set_forecast_age(age.num_milliseconds() as f64 / 1000.0);
                Some(result)
            }
            Err(e) => {
                self.metrics.record_forecast_fetch_error();
                warn!(workload = %workload, error = %e, "forecast fetch failed");
                None
            }
        }
    }
}

#[tonic::async_trait]
impl ExternalScaler for KedastralScaler {
    async fn is_active(
        &self,
        request: Request<ScaledObjectRef>,
    ) -> Result<Response<IsActiveResponse>, Status> {
        let start = Instant::now();
        let reference = request.into_inner();

        let Some(workload) = Self::resolve_workload(&reference) else {
            self.metrics.record_grpc_request("IsActive", "error");
            return Err(Status::not_found("no workload in scaler metadata"));
        };

        let result = match self.fetch(&workload).await {
            Some(result) if !is_stale(&result.snapshot, self.stale_after) => self
                .replicas_at_lead(&result.snapshot)
                .map(|replicas| replicas > 0)
                .unwrap_or(false),
            _ => false,
        };

        debug!(workload = %workload, active = result, "IsActive");
        self.metrics.record_grpc_request("IsActive", "ok");
        self.metrics
            .observe_grpc_duration("IsActive", start.elapsed().as_secs_f64());
        Ok(Response::new(IsActiveResponse { result }))
    }

    async fn get_metric_spec(
        &self,
        request: Request<ScaledObjectRef>,
    ) -> Result<Response<GetMetricSpecResponse>, Status> {
        let start = Instant::now();
        let reference = request.into_inner();

        let Some(workload) = Self::resolve_workload(&reference) else {
            self.metrics.record_grpc_request("GetMetricSpec", "error");
            return Err(Status::not_found("no workload in scaler metadata"));
        };

        // target_size = 1: the host autoscaler divides the reported metric by
        // the target, so the metric value is the absolute desired replicas.
        let spec = MetricSpec {
            metric_name: Self::metric_name(&reference, &workload),
            target_size: 1,
        };

        self.metrics.record_grpc_request("GetMetricSpec", "ok");
        self.metrics
            .observe_grpc_duration("GetMetricSpec", start.elapsed().as_secs_f64());
        Ok(Response::new(GetMetricSpecResponse {
            metric_specs: vec![spec],
        }))
    }

    async fn get_metrics(
        &self,
        request: Request<GetMetricsRequest>,
    ) -> Result<Response<GetMetricsResponse>, Status> {
        let start = Instant::now();
        let request = request.into_inner();

        let Some(workload) = request
            .scaled_object_ref
            .as_ref()
            .and_then(Self::resolve_workload)
        else {
            self.metrics.record_grpc_request("GetMetrics", "error");
            return Err(Status::not_found("no workload in scaler metadata"));
        };

        let replicas = match self.fetch(&workload).await {
            Some(result) => {
                if is_stale(&result.snapshot, self.stale_after) {
                    warn!(
                        workload = %workload,
                        generated_at = %result.snapshot.generated_at,
                        "snapshot is stale, returning default minimum"
                    );
                    self.default_min
                } else {
                    match self.replicas_at_lead(&result.snapshot) {
                        Some(replicas) => replicas,
                        None => {
                            warn!(workload = %workload, "snapshot not indexable, returning default minimum");
                            self.default_min
                        }
                    }
                }
            }
            None => self.default_min,
        };

        let metric_name = if request.metric_name.is_empty() {
            format!("kedastral-{workload}-desired-replicas")
        } else {
            request.metric_name
        };

        debug!(workload = %workload, replicas, "GetMetrics");
        self.metrics.set_desired_replicas(replicas);
        self.metrics.record_grpc_request("GetMetrics", "ok");
        self.metrics
            .observe_grpc_duration("GetMetrics", start.elapsed().as_secs_f64());

        Ok(Response::new(GetMetricsResponse {
            metric_values: vec![MetricValue {
                metric_name,
                metric_value: replicas,
            }],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reference(workload: &str) -> ScaledObjectRef {
        let mut scaler_metadata = HashMap::new();
        if !workload.is_empty() {
            scaler_metadata.insert("workload".to_string(), workload.to_string());
        }
        ScaledObjectRef {
            name: String::new(),
            namespace: "default".to_string(),
            scaler_metadata,
        }
    }

    fn snapshot(step_seconds: u64, desired: &[i64]) -> Snapshot {
        Snapshot {
            workload: "web".to_string(),
            metric: "rps".to_string(),
            generated_at: chrono::Utc::now(),
            step_seconds,
            horizon_seconds: step_seconds * desired.len() as u64,
            values: desired.iter().map(|&r| r as f64 * 100.0).collect(),
            desired_replicas: desired.to_vec(),
        }
    }

    fn scaler(lead_secs: u64) -> KedastralScaler {
        KedastralScaler::new(
            ForecasterClient::new("http://localhost:1"),
            Duration::from_secs(lead_secs),
            Duration::from_secs(60),
            2,
            ScalerMetrics::new(),
        )
    }

    #[test]
    fn workload_resolution_prefers_metadata() {
        let mut r = reference("from-metadata");
        r.name = "from-name".to_string();
        assert_eq!(
            KedastralScaler::resolve_workload(&r),
            Some("from-metadata".to_string())
        );
    }

    #[test]
    fn workload_resolution_falls_back_to_name() {
        let mut r = reference("");
        r.name = "from-name".to_string();
        assert_eq!(
            KedastralScaler::resolve_workload(&r),
            Some("from-name".to_string())
        );
        assert_eq!(KedastralScaler::resolve_workload(&reference("")), None);
    }

    #[test]
    fn metric_name_uses_override_when_present() {
        let mut r = reference("web");
        assert_eq!(
            KedastralScaler::metric_name(&r, "web"),
            "kedastral-web-desired-replicas"
        );
        r.scaler_metadata
            .insert("metricName".to_string(), "my-metric".to_string());
        assert_eq!(KedastralScaler::metric_name(&r, "web"), "my-metric");
    }

    #[test]
    fn lead_index_floors_and_saturates() {
        let s = scaler(300); // 5 steps at 60s
        assert_eq!(
            s.replicas_at_lead(&snapshot(60, &[1, 2, 3, 4, 5, 6, 7, 8])),
            Some(6)
        );
        // Saturates at the last index.
        assert_eq!(s.replicas_at_lead(&snapshot(60, &[1, 2, 3])), Some(3));
        // Partial steps are floored: 300s / 90s = 3.
        assert_eq!(
            s.replicas_at_lead(&snapshot(90, &[1, 2, 3, 4, 5, 6])),
            Some(4)
        );
    }

    #[test]
    fn unindexable_snapshots_yield_none() {
        let s = scaler(300);
        assert_eq!(s.replicas_at_lead(&snapshot(0, &[1, 2, 3])), None);
        assert_eq!(s.replicas_at_lead(&snapshot(60, &[])), None);
    }

    #[tokio::test]
    async fn get_metrics_without_workload_is_not_found() {
        let s = scaler(300);
        let status = s
            .get_metrics(Request::new(GetMetricsRequest {
                scaled_object_ref: Some(reference("")),
                metric_name: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn get_metrics_falls_back_when_forecaster_unreachable() {
        // Nothing listens on the client's port: the fetch fails and the
        // fallback minimum is returned instead of a wire error.
        let s = scaler(300);
        let response = s
            .get_metrics(Request::new(GetMetricsRequest {
                scaled_object_ref: Some(reference("web")),
                metric_name: String::new(),
            }))
            .await
            .unwrap();
        let values = response.into_inner().metric_values;
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].metric_value, 2);
        assert_eq!(values[0].metric_name, "kedastral-web-desired-replicas");
    }

    #[tokio::test]
    async fn is_active_is_false_when_forecaster_unreachable() {
        let s = scaler(300);
        let response = s.is_active(Request::new(reference("web"))).await.unwrap();
        assert!(!response.into_inner().result);
    }

    #[tokio::test]
    async fn get_metric_spec_reports_target_size_one() {
        let s = scaler(300);
        let response = s
            .get_metric_spec(Request::new(reference("web")))
            .await
            .unwrap();
        let specs = response.into_inner().metric_specs;
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].metric_name, "kedastral-web-desired-replicas");
        assert_eq!(specs[0].target_size, 1);
    }
}
