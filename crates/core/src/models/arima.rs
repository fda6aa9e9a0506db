//! ARIMA(p,d,q) forecasting model
//!
//! Fits an autoregressive integrated moving-average model on a single-tick
//! basis:
//!  1. difference the series `d` times and centre it on its mean
//!  2. fit AR coefficients by solving the Yule-Walker equations with the
//!     Levinson-Durbin recurrence over sample autocorrelations
//!  3. fit MA coefficients with the innovations algorithm over residual
//!     autocovariances
//!
//! Prediction runs the recursion forward with zeroed future errors, inverts
//! the differencing and clamps the result to `[0, 1e9]` so explosive roots
//! never leak unbounded values. The fitted state is one bundle behind a
//! `RwLock`: `train` swaps it atomically, concurrent `predict` calls read a
//! consistent coefficient set.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{FeatureFrame, Forecast, Model, ModelError};

/// Upper clamp applied to every prediction.
const MAX_PREDICTION: f64 = 1e9;

/// Variance below this is treated as a perfectly flat series.
const VARIANCE_EPSILON: f64 = 1e-12;

pub struct ArimaModel {
    metric: String,
    step_sec: u64,
    horizon_sec: u64,
    p: usize,
    d: usize,
    q: usize,
    fitted: RwLock<Option<FittedState>>,
}

/// Coefficients and carry-over state produced by one training pass.
#[derive(Debug, Clone)]
struct FittedState {
    /// AR coefficients phi_1..phi_p.
    ar_coeffs: Vec<f64>,
    /// MA coefficients theta_1..theta_q.
    ma_coeffs: Vec<f64>,
    /// Mean of the differenced series.
    mean: f64,
    /// Last p centred values of the differenced series, most recent first.
    last_values: Vec<f64>,
    /// Last q one-step residuals, most recent first.
    last_errors: Vec<f64>,
    /// diff_tails[i] is the last value of the i-times differenced series,
    /// retained to invert the differencing at prediction time.
    diff_tails: Vec<f64>,
}

impl ArimaModel {
    /// Creates an ARIMA model. An order of 0 means "auto" and resolves to 1.
    /// Rejects an empty metric, a zero step, a horizon shorter than one step
    /// and `d > 2`.
    pub fn new(
        metric: impl Into<String>,
        step_sec: u64,
        horizon_sec: u64,
        p: usize,
        d: usize,
        q: usize,
    ) -> Result<Self, ModelError> {
        let metric = metric.into();
        if metric.is_empty() {
            return Err(ModelError::InvalidConfig("metric is required".into()));
        }
        if step_sec == 0 {
            return Err(ModelError::InvalidConfig("step must be positive".into()));
        }
        if horizon_sec < step_sec {
            return Err(ModelError::InvalidConfig(
                "horizon must be at least one step".into(),
            ));
        }

        let p = if p == 0 { 1 } else { p };
        let d = if d == 0 { 1 } else { d };
        let q = if q == 0 { 1 } else { q };

        if d > 2 {
            return Err(ModelError::InvalidConfig(format!(
                "differencing order {d} is not supported (max 2)"
            )));
        }

        Ok(Self {
            metric,
            step_sec,
            horizon_sec,
            p,
            d,
            q,
            fitted: RwLock::new(None),
        })
    }

    fn min_points(&self) -> usize {
        (self.p + self.d).max(self.q + self.d).max(10)
    }

    fn fit(&self, values: &[f64]) -> Result<FittedState, ModelError> {
        let needed = self.min_points();
        if values.len() < needed {
            return Err(ModelError::InsufficientData {
                needed,
                got: values.len(),
                p: self.p,
                d: self.d,
                q: self.q,
            });
        }

        // Difference d times, retaining each level's tail for inversion.
        let mut series = values.to_vec();
        let mut diff_tails = Vec::with_capacity(self.d);
        for _ in 0..self.d {
            diff_tails.push(*series.last().expect("series non-empty"));
            series = difference(&series);
        }

        let n = series.len() as f64;
        let mean = series.iter().sum::<f64>() / n;
        let centred: Vec<f64> = series.iter().map(|v| v - mean).collect();

        let c0 = autocovariance(&centred, 0);
        let (ar_coeffs, residuals) = if c0 < VARIANCE_EPSILON {
            // Flat (or numerically flat) series: nothing to regress on.
            (vec![0.0; self.p], vec![0.0; centred.len().saturating_sub(self.p)])
        } else {
            let autocorr: Vec<f64> = (0..=self.p)
                .map(|k| autocovariance(&centred, k) / c0)
                .collect();
            let ar = levinson_durbin(&autocorr, self.p)?;
            let residuals = one_step_residuals(&centred, &ar);
            (ar, residuals)
        };

        let ma_coeffs = fit_ma(&residuals, self.q);

        let last_values = tail_reversed(&centred, self.p);
        let last_errors = tail_reversed(&residuals, self.q);

        Ok(FittedState {
            ar_coeffs,
            ma_coeffs,
            mean,
            last_values,
            last_errors,
            diff_tails,
        })
    }
}

#[async_trait]
impl Model for ArimaModel {
    async fn train(&self, history: &FeatureFrame) -> Result<(), ModelError> {
        let values = history.values();
        let state = self.fit(&values)?;
        // Single critical section: predictions see the old state or the new
        // one, never a mixture.
        *self.fitted.write().await = Some(state);
        Ok(())
    }

    async fn predict(&self, _features: &FeatureFrame) -> Result<Forecast, ModelError> {
        let state = {
            let guard = self.fitted.read().await;
            guard.clone().ok_or(ModelError::NotTrained)?
        };

        let steps = (self.horizon_sec / self.step_sec) as usize;

        let mut values = state.last_values.clone();
        let mut errors = state.last_errors.clone();
        let mut diff_preds = Vec::with_capacity(steps);

        for _ in 0..steps {
            let mut centred_pred = 0.0;
            for (k, &phi) in state.ar_coeffs.iter().enumerate() {
                centred_pred += phi * values.get(k).copied().unwrap_or(0.0);
            }
            for (k, &theta) in state.ma_coeffs.iter().enumerate() {
                centred_pred += theta * errors.get(k).copied().unwrap_or(0.0);
            }

            values.insert(0, centred_pred);
            values.truncate(self.p);
            // No future observation: the innovation is zero.
            errors.insert(0, 0.0);
            errors.truncate(self.q);

            diff_preds.push(centred_pred + state.mean);
        }

        // Invert the differencing, innermost level first.
        for level in (0..state.diff_tails.len()).rev() {
            let mut running = state.diff_tails[level];
            for pred in diff_preds.iter_mut() {
                running += *pred;
                *pred = running;
            }
        }

        let values = diff_preds
            .into_iter()
            .map(|v| if v.is_finite() { v.clamp(0.0, MAX_PREDICTION) } else { 0.0 })
            .collect();

        Ok(Forecast {
            metric: self.metric.clone(),
            values,
            step_sec: self.step_sec,
            horizon_sec: self.horizon_sec,
        })
    }

    fn name(&self) -> String {
        format!("arima({},{},{})", self.p, self.d, self.q)
    }
}

/// First difference: y'[t] = y[t+1] - y[t].
fn difference(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Biased sample autocovariance at the given lag.
fn autocovariance(series: &[f64], lag: usize) -> f64 {
    if series.len() <= lag {
        return 0.0;
    }
    let n = series.len() as f64;
    series[lag..]
        .iter()
        .zip(series.iter())
        .map(|(a, b)| a * b)
        .sum::<f64>()
        / n
}

/// Solves the Yule-Walker system for AR coefficients with the
/// Levinson-Durbin recurrence. `autocorr` holds r(0)..r(p) with r(0) = 1.
fn levinson_durbin(autocorr: &[f64], p: usize) -> Result<Vec<f64>, ModelError> {
    let mut phi = vec![0.0; p + 1];
    let mut variance = autocorr[0];

    for k in 1..=p {
        if variance <= 0.0 {
            return Err(ModelError::NumericalInstability(
                "non-positive pivot in Levinson-Durbin recurrence".into(),
            ));
        }

        let mut acc = autocorr[k];
        for j in 1..k {
            acc -= phi[j] * autocorr[k - j];
        }
        let reflection = acc / variance;

        let prev = phi.clone();
        phi[k] = reflection;
        for j in 1..k {
            phi[j] = prev[j] - reflection * prev[k - j];
        }

        variance *= 1.0 - reflection * reflection;
    }

    Ok(phi[1..=p].to_vec())
}

/// One-step AR residuals eps[t] = y[t] - sum_k phi_k * y[t-k].
fn one_step_residuals(centred: &[f64], ar: &[f64]) -> Vec<f64> {
    let p = ar.len();
    if centred.len() <= p {
        return Vec::new();
    }
    (p..centred.len())
        .map(|t| {
            let mut pred = 0.0;
            for (k, &phi) in ar.iter().enumerate() {
                pred += phi * centred[t - 1 - k];
            }
            centred[t] - pred
        })
        .collect()
}

/// Fits MA coefficients theta_1..theta_q with the innovations algorithm on
/// the residual autocovariances. A near-zero residual variance (the AR part
/// already explained the series) yields zero coefficients.
fn fit_ma(residuals: &[f64], q: usize) -> Vec<f64> {
    if q == 0 || residuals.len() <= 1 {
        return vec![0.0; q];
    }

    let g: Vec<f64> = (0..=q).map(|k| autocovariance(residuals, k)).collect();
    if g[0] < VARIANCE_EPSILON {
        return vec![0.0; q];
    }

    let mut v = vec![0.0; q + 1];
    let mut theta = vec![vec![0.0; q + 1]; q + 1];
    v[0] = g[0];

    for n in 1..=q {
        for k in 0..n {
            let mut acc = g[n - k];
            for j in 0..k {
                acc -= theta[k][k - j] * theta[n][n - j] * v[j];
            }
            theta[n][n - k] = if v[k].abs() < VARIANCE_EPSILON {
                0.0
            } else {
                acc / v[k]
            };
        }
        let mut vn = g[0];
        for j in 0..n {
            vn -= theta[n][n - j] * theta[n][n - j] * v[j];
        }
        v[n] = vn.max(0.0);
    }

    (1..=q).map(|k| theta[q][k]).collect()
}

/// Last `n` elements, most recent first, zero-padded when the series is
/// shorter than `n`.
fn tail_reversed(series: &[f64], n: usize) -> Vec<f64> {
    let mut out: Vec<f64> = series.iter().rev().take(n).copied().collect();
    out.resize(n, 0.0);
    out
}
