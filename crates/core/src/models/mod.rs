//! Forecasting models
//!
//! A [`Model`] turns recent feature rows into a fixed-length forecast of
//! future metric values. Two implementations exist: a stateless EMA +
//! seasonality baseline and an ARIMA(p,d,q) model with Yule-Walker fitting.

mod arima;
mod baseline;

pub use arima::ArimaModel;
pub use baseline::BaselineModel;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Ordered feature rows produced by the feature builder. Each row maps a
/// feature name (`value`, `timestamp`, `hour`, `day`) to a real number.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    pub rows: Vec<HashMap<String, f64>>,
}

impl FeatureFrame {
    /// The ordered `value` series, skipping rows without one.
    pub fn values(&self) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get("value").copied())
            .collect()
    }
}

/// A fixed-resolution forecast of future metric values.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Name of the forecasted metric.
    pub metric: String,
    /// One value per future step, all finite and non-negative.
    pub values: Vec<f64>,
    /// Step resolution in seconds.
    pub step_sec: u64,
    /// Total forecast window in seconds.
    pub horizon_sec: u64,
}

/// Errors produced by model construction, training and prediction.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("features cannot be empty")]
    EmptyFeatures,

    #[error("no 'value' field found in features")]
    NoValueField,

    #[error("need at least {needed} points for ARIMA({p},{d},{q}), got {got}")]
    InsufficientData {
        needed: usize,
        got: usize,
        p: usize,
        d: usize,
        q: usize,
    },

    #[error("model not trained")]
    NotTrained,

    #[error("numerical instability: {0}")]
    NumericalInstability(String),
}

/// A forecasting model. `train` is a writer over internal state, `predict`
/// a reader; implementations must allow concurrent predictions and swap
/// trained state atomically so readers never observe a partial update.
#[async_trait]
pub trait Model: Send + Sync {
    /// Fit the model on historical feature rows.
    async fn train(&self, history: &FeatureFrame) -> Result<(), ModelError>;

    /// Produce a forecast from recent feature rows.
    async fn predict(&self, features: &FeatureFrame) -> Result<Forecast, ModelError>;

    /// Model identifier for logs and metrics.
    fn name(&self) -> String;
}

/// Exponential moving average over the most recent `n` points, seeded with
/// the first value of the window. With fewer than `n` points all available
/// points are used. Empty input yields 0.
pub(crate) fn compute_ema(values: &[f64], n: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let start = values.len().saturating_sub(n);
    let window = &values[start..];

    let alpha = 2.0 / (window.len() as f64 + 1.0);
    let mut ema = window[0];
    for &v in &window[1..] {
        ema = alpha * v + (1.0 - alpha) * ema;
    }
    ema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_of_empty_is_zero() {
        assert_eq!(compute_ema(&[], 5), 0.0);
    }

    #[test]
    fn ema_of_single_value_is_that_value() {
        assert_eq!(compute_ema(&[42.0], 5), 42.0);
    }

    #[test]
    fn ema_tracks_constant_series() {
        let values = vec![10.0; 50];
        assert!((compute_ema(&values, 5) - 10.0).abs() < 1e-9);
        assert!((compute_ema(&values, 30) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn ema_uses_only_last_n_points() {
        // A huge spike outside the window must not affect the result.
        let mut values = vec![1_000_000.0];
        values.extend(std::iter::repeat(5.0).take(10));
        let ema = compute_ema(&values, 5);
        assert!((ema - 5.0).abs() < 1e-9);
    }

    #[test]
    fn feature_frame_values_skips_rows_without_value() {
        let frame = FeatureFrame {
            rows: vec![
                HashMap::from([("value".to_string(), 1.0)]),
                HashMap::from([("hour".to_string(), 3.0)]),
                HashMap::from([("value".to_string(), 2.0)]),
            ],
        };
        assert_eq!(frame.values(), vec![1.0, 2.0]);
    }
}
