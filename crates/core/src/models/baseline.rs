//! Baseline forecasting model
//!
//! A simple model built from exponential moving averages and optional
//! hour-of-day seasonality:
//!  1. base = 0.7*EMA(5) + 0.3*EMA(30) over the recent window
//!  2. if the series has >= 2 points and the last value exceeds the base,
//!     the last value becomes a floor (honours an upward trend)
//!  3. with seasonality for the future hour: out = 0.8*base + 0.2*mean_h
//!  4. every output is non-negative
//!
//! Training is optional; it only populates the hour-of-day means.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{compute_ema, FeatureFrame, Forecast, Model, ModelError};

pub struct BaselineModel {
    metric: String,
    step_sec: u64,
    horizon_sec: u64,
    /// Hour-of-day (0-23) -> mean value, populated by `train`.
    seasonality: RwLock<HashMap<i64, f64>>,
}

impl BaselineModel {
    pub fn new(metric: impl Into<String>, step_sec: u64, horizon_sec: u64) -> Self {
        Self {
            metric: metric.into(),
            step_sec,
            horizon_sec,
            seasonality: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Model for BaselineModel {
    /// Computes hour-of-day means from history. Hours with fewer than two
    /// observations are skipped; empty history is a no-op.
    async fn train(&self, history: &FeatureFrame) -> Result<(), ModelError> {
        if history.rows.is_empty() {
            return Ok(());
        }

        let mut sums: HashMap<i64, f64> = HashMap::new();
        let mut counts: HashMap<i64, u32> = HashMap::new();

        for row in &history.rows {
            let (Some(&value), Some(&hour)) = (row.get("value"), row.get("hour")) else {
                continue;
            };
            let h = hour as i64;
            if (0..24).contains(&h) {
                *sums.entry(h).or_default() += value;
                *counts.entry(h).or_default() += 1;
            }
        }

        let mut seasonality = self.seasonality.write().await;
        for (h, count) in counts {
            if count >= 2 {
                seasonality.insert(h, sums[&h] / count as f64);
            }
        }

        Ok(())
    }

    async fn predict(&self, features: &FeatureFrame) -> Result<Forecast, ModelError> {
        if features.rows.is_empty() {
            return Err(ModelError::EmptyFeatures);
        }

        let values = features.values();
        if values.is_empty() {
            return Err(ModelError::NoValueField);
        }

        let ema5 = compute_ema(&values, 5);
        let ema30 = compute_ema(&values, 30);

        let mut base = 0.7 * ema5 + 0.3 * ema30;

        let last_value = values[values.len() - 1];
        if values.len() >= 2 && last_value > base {
            base = last_value;
        }
        base = base.max(0.0);

        let num_steps = ((self.horizon_sec / self.step_sec.max(1)) as usize).max(1);

        let current_hour = features
            .rows
            .last()
            .and_then(|row| row.get("hour"))
            .map(|&h| h as i64);

        let seasonality = self.seasonality.read().await;
        let mut out = Vec::with_capacity(num_steps);
        for i in 0..num_steps {
            let mut value = base;

            if let Some(h0) = current_hour {
                if !seasonality.is_empty() {
                    let hours_ahead = (i as u64 * self.step_sec / 3600) as i64;
                    let future_hour = (h0 + hours_ahead).rem_euclid(24);
                    if let Some(&seasonal_mean) = seasonality.get(&future_hour) {
                        value = 0.8 * base + 0.2 * seasonal_mean;
                    }
                }
            }

            out.push(value.max(0.0));
        }

        Ok(Forecast {
            metric: self.metric.clone(),
            values: out,
            step_sec: self.step_sec,
            horizon_sec: self.horizon_sec,
        })
    }

    fn name(&self) -> String {
        "baseline".to_string()
    }
}
