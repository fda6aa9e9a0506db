//! Capacity planning
//!
//! Converts a forecasted load series into desired replica counts using a
//! deterministic policy (target per pod, headroom, lead time, clamps). The
//! planner is a pure function: no clocks, no I/O, no shared state, so it is
//! trivially safe to call concurrently and to exercise with property-style
//! tests.

/// How fractional pod counts are turned into integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    #[default]
    Ceil,
    Round,
    Floor,
}

impl RoundingMode {
    /// Parse a rounding mode name. Unknown names fall back to `Ceil`, the
    /// conservative default.
    pub fn parse(s: &str) -> Self {
        match s {
            "floor" => RoundingMode::Floor,
            "round" => RoundingMode::Round,
            _ => RoundingMode::Ceil,
        }
    }
}

/// Policy defines how forecasted load is translated into replicas.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Sustainable throughput per pod at the target service level
    /// (e.g. RPS per pod). Must be > 0.
    pub target_per_pod: f64,

    /// Multiplicative safety factor (e.g. 1.2 for +20%). Must be >= 1.0.
    pub headroom: f64,

    /// Pre-warm capacity this many seconds before the predicted need.
    pub lead_time_seconds: i64,

    /// Replica bounds. `max_replicas == 0` means "no upper bound".
    pub min_replicas: i64,
    pub max_replicas: i64,

    /// Caps how fast we can scale up relative to the previous step.
    /// Example: 2.0 allows doubling per step at most. If <= 0, defaults to 2.0.
    pub up_max_factor_per_step: f64,

    /// Caps how fast we can scale down (percentage of previous).
    /// Example: 50 means we can drop at most 50% per step. Clamped to [0,100].
    pub down_max_percent_per_step: i64,

    /// Extra steps beyond the lead index to consider for the peak.
    /// 0 = single point at i+i0 (conservative).
    pub prewarm_window_steps: i64,

    /// Rounding mode for fractional pods.
    pub rounding_mode: RoundingMode,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            target_per_pod: 100.0,
            headroom: 1.2,
            lead_time_seconds: 300,
            min_replicas: 1,
            max_replicas: 100,
            up_max_factor_per_step: 2.0,
            down_max_percent_per_step: 50,
            prewarm_window_steps: 0,
            rounding_mode: RoundingMode::Ceil,
        }
    }
}

/// Converts a forecasted load series into desired replicas, applying the
/// policy. `prev` is the previously applied desired replica count (from the
/// last control loop tick). `forecast` contains the metric values for each
/// future step. `step_sec` is the step resolution in seconds.
pub fn to_replicas(prev: i64, forecast: &[f64], step_sec: i64, mut p: Policy) -> Vec<i64> {
    if forecast.is_empty() {
        return Vec::new();
    }
    // ---- sanitize policy ----
    if p.target_per_pod <= 0.0 {
        p.target_per_pod = 1.0;
    }
    if p.headroom < 1.0 {
        p.headroom = 1.0;
    }
    if p.min_replicas < 0 {
        p.min_replicas = 0;
    }
    if p.max_replicas > 0 && p.max_replicas < p.min_replicas {
        p.max_replicas = p.min_replicas;
    }
    let step_sec = if step_sec <= 0 { 60 } else { step_sec };
    if p.up_max_factor_per_step <= 0.0 {
        p.up_max_factor_per_step = 2.0;
    }
    p.down_max_percent_per_step = p.down_max_percent_per_step.clamp(0, 100);
    if p.prewarm_window_steps < 0 {
        p.prewarm_window_steps = 0;
    }

    // ---- adjusted capacity requirement per step (load -> pods before rounding) ----
    let adj: Vec<f64> = forecast
        .iter()
        .map(|&v| (v.max(0.0) / p.target_per_pod) * p.headroom)
        .collect();

    // lead time offset in steps
    let i0 = ((p.lead_time_seconds.max(0) as f64) / (step_sec as f64)).ceil() as usize;

    let mut res = Vec::with_capacity(forecast.len());
    let mut prev_out = clamp_bounds(prev, p.min_replicas, p.max_replicas);

    for i in 0..adj.len() {
        // Conservative pick: single point at i+i0.
        // If prewarm_window_steps > 0, take the max over [j_start..=j_end].
        let j_start = (i + i0).min(adj.len() - 1);
        let j_end = (j_start + p.prewarm_window_steps as usize).min(adj.len() - 1);
        let need = adj[j_start..=j_end]
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v));

        let mut desired = round_pods(need, p.rounding_mode);

        // Apply bounds, then change clamps, then bounds again.
        desired = clamp_bounds(desired, p.min_replicas, p.max_replicas);
        desired = clamp_change(
            prev_out,
            desired,
            p.up_max_factor_per_step,
            p.down_max_percent_per_step,
        );
        desired = clamp_bounds(desired, p.min_replicas, p.max_replicas);

        res.push(desired);
        prev_out = desired;
    }
    res
}

fn round_pods(x: f64, mode: RoundingMode) -> i64 {
    match mode {
        RoundingMode::Floor => x.floor() as i64,
        RoundingMode::Round => x.round() as i64,
        RoundingMode::Ceil => x.ceil() as i64,
    }
}

fn clamp_bounds(x: i64, lo: i64, hi: i64) -> i64 {
    if hi > 0 && x > hi {
        return hi;
    }
    if x < lo {
        return lo;
    }
    x
}

fn clamp_change(prev: i64, next: i64, up_factor: f64, down_pct: i64) -> i64 {
    let prev = prev.max(0);
    // Cold start: without prior capacity, allow the requested value directly,
    // but still guard absurd ups with up_factor.
    if prev == 0 {
        let max_up = (1.0 * up_factor).ceil() as i64;
        if next > max_up {
            return max_up;
        }
        return next;
    }
    let max_up = ((prev as f64) * up_factor).ceil() as i64;
    let min_down = ((prev as f64) * (1.0 - down_pct as f64 / 100.0)).floor() as i64;
    if next > max_up {
        return max_up;
    }
    if next < min_down {
        return min_down;
    }
    next
}
