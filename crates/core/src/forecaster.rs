//! Forecast control loop
//!
//! Orchestrates one workload's pipeline on a fixed interval:
//! collect -> build features -> train -> predict -> plan -> store snapshot.
//! Each stage failure is recorded and abandons the current tick; the loop
//! itself never crashes. Ticks are strictly serial: a new tick does not
//! start until the previous one has placed its snapshot or failed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::adapters::Adapter;
use crate::capacity::{self, Policy};
use crate::features::FeatureBuilder;
use crate::models::Model;
use crate::observability::ForecasterMetrics;
use crate::storage::{Snapshot, Store};

pub struct Forecaster {
    workload: String,
    adapter: Arc<dyn Adapter>,
    model: Arc<dyn Model>,
    builder: FeatureBuilder,
    store: Arc<dyn Store>,
    policy: Policy,
    horizon: Duration,
    step: Duration,
    window: Duration,
    metrics: ForecasterMetrics,

    /// Previously applied desired replica count, carried between ticks.
    current_replicas: i64,
}

impl Forecaster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workload: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        model: Arc<dyn Model>,
        store: Arc<dyn Store>,
        policy: Policy,
        horizon: Duration,
        step: Duration,
        window: Duration,
    ) -> Self {
        let workload = workload.into();
        let metrics = ForecasterMetrics::new(&workload);
        let current_replicas = policy.min_replicas;
        Self {
            workload,
            adapter,
            model,
            builder: FeatureBuilder::new(),
            store,
            policy,
            horizon,
            step,
            window,
            metrics,
            current_replicas,
        }
    }

    /// Runs the forecast loop until shutdown. The first tick executes
    /// immediately; subsequent ticks follow at the given interval. Tick
    /// failures are logged and never terminate the loop.
    pub async fn run(mut self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(
            workload = %self.workload,
            interval_secs = interval.as_secs(),
            model = %self.model.name(),
            "starting forecast loop"
        );

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(workload = %self.workload, error = %e, "forecast tick failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!(workload = %self.workload, "forecast loop stopped");
                    break;
                }
            }
        }
    }

    /// Performs one forecast cycle.
    pub async fn tick(&mut self) -> Result<()> {
        let start = Instant::now();

        let collect_start = Instant::now();
        let df = match self.adapter.collect(self.window.as_secs()).await {
            Ok(df) => df,
            Err(e) => {
                self.metrics.inc_error("adapter", "collect");
                return Err(e.context("collect"));
            }
        };
        let collect_duration = collect_start.elapsed();
        self.metrics
            .observe_collect(self.adapter.name(), collect_duration.as_secs_f64());
        debug!(
            adapter = self.adapter.name(),
            rows = df.rows.len(),
            "collected metrics"
        );

        let features = match self.builder.build(&df) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.inc_error("features", "build");
                return Err(e.context("build features"));
            }
        };

        if let Err(e) = self.model.train(&features).await {
            self.metrics.inc_error("model", "train");
            return Err(anyhow::Error::new(e).context("train"));
        }

        let predict_start = Instant::now();
        let forecast = match self.model.predict(&features).await {
            Ok(forecast) => forecast,
            Err(e) => {
                self.metrics.inc_error("model", "predict");
                return Err(anyhow::Error::new(e).context("predict"));
            }
        };
        let predict_duration = predict_start.elapsed();
        self.metrics
            .observe_predict(&self.model.name(), predict_duration.as_secs_f64());

        let capacity_start = Instant::now();
        let desired = capacity::to_replicas(
            self.current_replicas,
            &forecast.values,
            self.step.as_secs() as i64,
            self.policy.clone(),
        );
        let capacity_duration = capacity_start.elapsed();
        self.metrics
            .observe_capacity(capacity_duration.as_secs_f64());

        let snapshot = Snapshot {
            workload: self.workload.clone(),
            metric: forecast.metric.clone(),
            generated_at: Utc::now(),
            step_seconds: self.step.as_secs(),
            horizon_seconds: self.horizon.as_secs(),
            values: forecast.values,
            desired_replicas: desired.clone(),
        };
        let put_result = self.store.put(snapshot).await;
        if put_result.is_err() {
            self.metrics.inc_error("storage", "put");
        }

        if let Some(&first) = desired.first() {
            self.current_replicas = first;
            self.metrics.set_desired_replicas(first);
        }

        put_result.context("store snapshot")?;

        info!(
            workload = %self.workload,
            current_replicas = self.current_replicas,
            forecast_points = desired.len(),
            collect_ms = collect_duration.as_millis() as u64,
            predict_ms = predict_duration.as_millis() as u64,
            capacity_ms = capacity_duration.as_millis() as u64,
            total_ms = start.elapsed().as_millis() as u64,
            "forecast tick complete"
        );

        Ok(())
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    pub fn current_replicas(&self) -> i64 {
        self.current_replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DataFrame;
    use crate::capacity::RoundingMode;
    use crate::models::BaselineModel;
    use crate::storage::MemoryStore;
    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StaticAdapter {
        values: Vec<f64>,
        fail: AtomicBool,
    }

    impl StaticAdapter {
        fn new(values: Vec<f64>) -> Self {
            Self {
                values,
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Adapter for StaticAdapter {
        async fn collect(&self, _window_seconds: u64) -> Result<DataFrame> {
            if self.fail.load(Ordering::SeqCst) {
                bail!("adapter unavailable");
            }
            let rows = self
                .values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    HashMap::from([
                        ("ts".to_string(), json!(1_700_000_000 + i as i64 * 60)),
                        ("value".to_string(), json!(v)),
                    ])
                })
                .collect();
            Ok(DataFrame { rows })
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn test_policy() -> Policy {
        Policy {
            target_per_pod: 50.0,
            headroom: 1.2,
            lead_time_seconds: 0,
            min_replicas: 1,
            max_replicas: 100,
            up_max_factor_per_step: 2.0,
            down_max_percent_per_step: 50,
            prewarm_window_steps: 0,
            rounding_mode: RoundingMode::Ceil,
        }
    }

    fn test_forecaster(adapter: Arc<StaticAdapter>, store: Arc<MemoryStore>) -> Forecaster {
        let model = Arc::new(BaselineModel::new("rps", 60, 300));
        Forecaster::new(
            "web",
            adapter,
            model,
            store,
            test_policy(),
            Duration::from_secs(300),
            Duration::from_secs(60),
            Duration::from_secs(1800),
        )
    }

    #[tokio::test]
    async fn tick_stores_a_complete_snapshot() {
        let adapter = Arc::new(StaticAdapter::new(vec![100.0, 110.0, 120.0]));
        let store = Arc::new(MemoryStore::new());
        let mut forecaster = test_forecaster(adapter, Arc::clone(&store));

        forecaster.tick().await.unwrap();

        let snapshot = store.get_latest("web").await.unwrap().unwrap();
        assert_eq!(snapshot.workload, "web");
        assert_eq!(snapshot.metric, "rps");
        assert_eq!(snapshot.step_seconds, 60);
        assert_eq!(snapshot.horizon_seconds, 300);
        assert_eq!(snapshot.values.len(), 5);
        assert_eq!(snapshot.desired_replicas.len(), 5);
        for &r in &snapshot.desired_replicas {
            assert!((1..=100).contains(&r));
        }
    }

    #[tokio::test]
    async fn tick_carries_current_replicas_forward() {
        let adapter = Arc::new(StaticAdapter::new(vec![100.0, 110.0, 120.0]));
        let store = Arc::new(MemoryStore::new());
        let mut forecaster = test_forecaster(adapter, Arc::clone(&store));

        assert_eq!(forecaster.current_replicas(), 1);
        forecaster.tick().await.unwrap();

        let snapshot = store.get_latest("web").await.unwrap().unwrap();
        assert_eq!(forecaster.current_replicas(), snapshot.desired_replicas[0]);
        assert!(forecaster.current_replicas() > 0);
    }

    #[tokio::test]
    async fn adapter_failure_abandons_tick_and_keeps_prior_snapshot() {
        let adapter = Arc::new(StaticAdapter::new(vec![100.0, 110.0]));
        let store = Arc::new(MemoryStore::new());
        let mut forecaster = test_forecaster(Arc::clone(&adapter), Arc::clone(&store));

        forecaster.tick().await.unwrap();
        let first = store.get_latest("web").await.unwrap().unwrap();

        adapter.fail.store(true, Ordering::SeqCst);
        let err = forecaster.tick().await.unwrap_err();
        assert!(err.to_string().contains("collect"));

        // The previous snapshot remains visible.
        let still = store.get_latest("web").await.unwrap().unwrap();
        assert_eq!(still, first);
    }

    #[tokio::test]
    async fn empty_window_abandons_tick() {
        let adapter = Arc::new(StaticAdapter::new(vec![]));
        let store = Arc::new(MemoryStore::new());
        let mut forecaster = test_forecaster(adapter, Arc::clone(&store));

        let err = forecaster.tick().await.unwrap_err();
        assert!(err.to_string().contains("build features"));
        assert!(store.get_latest("web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let adapter = Arc::new(StaticAdapter::new(vec![10.0, 10.0]));
        let store = Arc::new(MemoryStore::new());
        let forecaster = test_forecaster(adapter, Arc::clone(&store));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(forecaster.run(Duration::from_secs(3600), rx));

        // The immediate first tick publishes a snapshot.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get_latest("web").await.unwrap().is_some());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
    }
}
