//! Forecaster metrics
//!
//! Prometheus metrics for the forecast control loop and snapshot API,
//! registered once in the default registry and exposed through the
//! process's `/metrics` endpoint.

use std::sync::OnceLock;

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    GaugeVec, HistogramVec, IntCounterVec, IntGaugeVec,
};

static GLOBAL_METRICS: OnceLock<ForecasterMetricsInner> = OnceLock::new();

struct ForecasterMetricsInner {
    adapter_collect_seconds: HistogramVec,
    model_predict_seconds: HistogramVec,
    capacity_compute_seconds: HistogramVec,
    forecast_age_seconds: GaugeVec,
    desired_replicas: IntGaugeVec,
    errors_total: IntCounterVec,
}

impl ForecasterMetricsInner {
    fn new() -> Self {
        Self {
            adapter_collect_seconds: register_histogram_vec!(
                "kedastral_adapter_collect_seconds",
                "Time spent collecting metrics from the adapter",
                &["workload", "adapter"]
            )
            .expect("register kedastral_adapter_collect_seconds"),

            model_predict_seconds: register_histogram_vec!(
                "kedastral_model_predict_seconds",
                "Time spent predicting the forecast",
                &["workload", "model"]
            )
            .expect("register kedastral_model_predict_seconds"),

            capacity_compute_seconds: register_histogram_vec!(
                "kedastral_capacity_compute_seconds",
                "Time spent computing desired replicas",
                &["workload"]
            )
            .expect("register kedastral_capacity_compute_seconds"),

            forecast_age_seconds: register_gauge_vec!(
                "kedastral_forecast_age_seconds",
                "Age of the current forecast in seconds",
                &["workload"]
            )
            .expect("register kedastral_forecast_age_seconds"),

            desired_replicas: register_int_gauge_vec!(
                "kedastral_desired_replicas",
                "Current desired replica count",
                &["workload"]
            )
            .expect("register kedastral_desired_replicas"),

            errors_total: register_int_counter_vec!(
                "kedastral_errors_total",
                "Total number of errors by component and reason",
                &["workload", "component", "reason"]
            )
            .expect("register kedastral_errors_total"),
        }
    }
}

/// Handle to the forecaster metrics, scoped to one workload. Clones share
/// the same underlying registry entries.
#[derive(Clone)]
pub struct ForecasterMetrics {
    workload: String,
}

impl ForecasterMetrics {
    pub fn new(workload: impl Into<String>) -> Self {
        GLOBAL_METRICS.get_or_init(ForecasterMetricsInner::new);
        Self {
            workload: workload.into(),
        }
    }

    fn inner(&self) -> &'static ForecasterMetricsInner {
        GLOBAL_METRICS.get().expect("metrics not initialized")
    }

    pub fn observe_collect(&self, adapter: &str, seconds: f64) {
        self.inner()
            .adapter_collect_seconds
            .with_label_values(&[&self.workload, adapter])
            .observe(seconds);
    }

    pub fn observe_predict(&self, model: &str, seconds: f64) {
        self.inner()
            .model_predict_seconds
            .with_label_values(&[&self.workload, model])
            .observe(seconds);
    }

    pub fn observe_capacity(&self, seconds: f64) {
        self.inner()
            .capacity_compute_seconds
            .with_label_values(&[&self.workload])
            .observe(seconds);
    }

    pub fn set_forecast_age(&self, seconds: f64) {
        self.inner()
            .forecast_age_seconds
            .with_label_values(&[&self.workload])
            .set(seconds);
    }

    pub fn set_desired_replicas(&self, replicas: i64) {
        self.inner()
            .desired_replicas
            .with_label_values(&[&self.workload])
            .set(replicas);
    }

    pub fn inc_error(&self, component: &str, reason: &str) {
        self.inner()
            .errors_total
            .with_label_values(&[&self.workload, component, reason])
            .inc();
    }
}
