//! Scaler metrics
//!
//! Prometheus metrics covering the gRPC service, forecast fetching and the
//! scaling decisions returned to the host autoscaler.

use std::sync::OnceLock;

use prometheus::{
    register_gauge, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Gauge, Histogram, HistogramVec, IntCounter,
    IntCounterVec, IntGauge,
};

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    grpc_requests_total: IntCounterVec,
    grpc_request_duration_seconds: HistogramVec,
    forecast_fetch_duration_seconds: Histogram,
    forecast_fetch_errors_total: IntCounter,
    desired_replicas_returned: IntGauge,
    forecast_age_seen_seconds: Gauge,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            grpc_requests_total: register_int_counter_vec!(
                "kedastral_scaler_grpc_requests_total",
                "Total number of gRPC requests by method and status",
                &["method", "status"]
            )
            .expect("register kedastral_scaler_grpc_requests_total"),

            grpc_request_duration_seconds: register_histogram_vec!(
                "kedastral_scaler_grpc_request_duration_seconds",
                "Duration of gRPC requests by method",
                &["method"]
            )
            .expect("register kedastral_scaler_grpc_request_duration_seconds"),

            forecast_fetch_duration_seconds: register_histogram!(
                "kedastral_scaler_forecast_fetch_duration_seconds",
                "Duration of forecast fetches from the forecaster"
            )
            .expect("register kedastral_scaler_forecast_fetch_duration_seconds"),

            forecast_fetch_errors_total: register_int_counter!(
                "kedastral_scaler_forecast_fetch_errors_total",
                "Total number of errors fetching forecasts"
            )
            .expect("register kedastral_scaler_forecast_fetch_errors_total"),

            desired_replicas_returned: register_int_gauge!(
                "kedastral_scaler_desired_replicas_returned",
                "Last desired replicas value returned to the host autoscaler"
            )
            .expect("register kedastral_scaler_desired_replicas_returned"),

            forecast_age_seen_seconds: register_gauge!(
                "kedastral_scaler_forecast_age_seen_seconds",
                "Age of the forecast data seen from the forecaster"
            )
            .expect("register kedastral_scaler_forecast_age_seen_seconds"),
        }
    }
}

/// Lightweight handle to the scaler metrics; clones share the same
/// underlying registry entries.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &'static ScalerMetricsInner {
        GLOBAL_METRICS.get().expect("metrics not initialized")
    }

    pub fn record_grpc_request(&self, method: &str, status: &str) {
        self.inner()
            .grpc_requests_total
            .with_label_values(&[method, status])
            .inc();
    }

    pub fn observe_grpc_duration(&self, method: &str, seconds: f64) {
        self.inner()
            .grpc_request_duration_seconds
            .with_label_values(&[method])
            .observe(seconds);
    }

    pub fn observe_forecast_fetch(&self, seconds: f64) {
        self.inner().forecast_fetch_duration_seconds.observe(seconds);
    }

    pub fn record_forecast_fetch_error(&self) {
        self.inner().forecast_fetch_errors_total.inc();
    }

    pub fn set_desired_replicas(&self, replicas: i64) {
        self.inner().desired_replicas_returned.set(replicas);
    }

    pub fn set_forecast_age(&self, seconds: f64) {
        self.inner().forecast_age_seen_seconds.set(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_accept_observations() {
        let metrics = ScalerMetrics::new();
        metrics.record_grpc_request("GetMetrics", "ok");
        metrics.observe_grpc_duration("GetMetrics", 0.002);
        metrics.observe_forecast_fetch(0.01);
        metrics.record_forecast_fetch_error();
        metrics.set_desired_replicas(5);
        metrics.set_forecast_age(42.0);

        let families = prometheus::gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"kedastral_scaler_grpc_requests_total"));
        assert!(names.contains(&"kedastral_scaler_desired_replicas_returned"));
    }
}
