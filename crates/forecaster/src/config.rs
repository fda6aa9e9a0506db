//! Forecaster configuration
//!
//! Every option is available as a flag or an environment variable, flags
//! taking precedence. Required options without defaults (workload, metric,
//! query) abort startup when missing.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use kedastral_core::capacity::{Policy, RoundingMode};

#[derive(Debug, Clone, Parser)]
#[command(name = "kedastral-forecaster", version, about = "Kedastral forecaster service")]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8081")]
    pub listen: String,

    /// Workload name snapshots are stored under
    #[arg(long, env = "WORKLOAD")]
    pub workload: String,

    /// Metric name, echoed in snapshots
    #[arg(long, env = "METRIC")]
    pub metric: String,

    /// Forecast horizon in seconds
    #[arg(long = "horizon-secs", env = "HORIZON_SECS", default_value_t = 1800)]
    pub horizon_secs: u64,

    /// Forecast step resolution in seconds
    #[arg(long = "step-secs", env = "STEP_SECS", default_value_t = 60)]
    pub step_secs: u64,

    /// Pre-scaling lead time in seconds
    #[arg(long = "lead-time-secs", env = "LEAD_TIME_SECS", default_value_t = 300)]
    pub lead_time_secs: u64,

    /// Target metric value per pod
    #[arg(long = "target-per-pod", env = "TARGET_PER_POD", default_value_t = 100.0)]
    pub target_per_pod: f64,

    /// Headroom multiplier
    #[arg(long, env = "HEADROOM", default_value_t = 1.2)]
    pub headroom: f64,

    /// Minimum replicas
    #[arg(long = "min", env = "MIN_REPLICAS", default_value_t = 1)]
    pub min_replicas: i64,

    /// Maximum replicas (0 = unbounded)
    #[arg(long = "max", env = "MAX_REPLICAS", default_value_t = 100)]
    pub max_replicas: i64,

    /// Max scale-up factor per step
    #[arg(long = "up-max-factor", env = "UP_MAX_FACTOR", default_value_t = 2.0)]
    pub up_max_factor: f64,

    /// Max scale-down percent per step
    #[arg(long = "down-max-percent", env = "DOWN_MAX_PERCENT", default_value_t = 50)]
    pub down_max_percent: i64,

    /// Extra steps beyond the lead index considered for the peak
    #[arg(long = "prewarm-window", env = "PREWARM_WINDOW", default_value_t = 0)]
    pub prewarm_window: i64,

    /// Rounding mode: ceil, round or floor
    #[arg(long, env = "ROUNDING", default_value = "ceil")]
    pub rounding: String,

    /// Prometheus range-query URL
    #[arg(
        long = "prom-url",
        env = "PROM_URL",
        default_value = "http://localhost:9090/api/v1/query_range"
    )]
    pub prom_url: String,

    /// PromQL query to evaluate
    #[arg(long = "prom-query", env = "PROM_QUERY")]
    pub prom_query: String,

    /// Forecast tick interval in seconds
    #[arg(long = "interval-secs", env = "INTERVAL_SECS", default_value_t = 30)]
    pub interval_secs: u64,

    /// Historical look-back window in seconds
    #[arg(long = "window-secs", env = "WINDOW_SECS", default_value_t = 1800)]
    pub window_secs: u64,

    /// Snapshot staleness threshold in seconds (0 = twice the interval)
    #[arg(long = "stale-after-secs", env = "STALE_AFTER_SECS", default_value_t = 0)]
    pub stale_after_secs: u64,

    /// Forecasting model: baseline or arima
    #[arg(long, env = "MODEL", default_value = "baseline")]
    pub model: String,

    /// ARIMA autoregressive order (0 = auto)
    #[arg(long = "arima-p", env = "ARIMA_P", default_value_t = 1)]
    pub arima_p: usize,

    /// ARIMA differencing order (0 = auto)
    #[arg(long = "arima-d", env = "ARIMA_D", default_value_t = 1)]
    pub arima_d: usize,

    /// ARIMA moving-average order (0 = auto)
    #[arg(long = "arima-q", env = "ARIMA_Q", default_value_t = 1)]
    pub arima_q: usize,

    /// In-memory snapshot TTL in seconds (0 = no expiry)
    #[arg(long = "store-ttl-secs", env = "STORE_TTL_SECS", default_value_t = 0)]
    pub store_ttl_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.step_secs == 0 {
            bail!("--step-secs must be positive");
        }
        if self.horizon_secs < self.step_secs {
            bail!("--horizon-secs must be at least one step");
        }
        if self.target_per_pod <= 0.0 {
            bail!("--target-per-pod must be positive");
        }
        if self.interval_secs == 0 {
            bail!("--interval-secs must be positive");
        }
        if !matches!(self.model.as_str(), "baseline" | "arima") {
            bail!("--model must be baseline or arima, got {:?}", self.model);
        }
        Ok(())
    }

    pub fn policy(&self) -> Policy {
        Policy {
            target_per_pod: self.target_per_pod,
            headroom: self.headroom,
            lead_time_seconds: self.lead_time_secs as i64,
            min_replicas: self.min_replicas,
            max_replicas: self.max_replicas,
            up_max_factor_per_step: self.up_max_factor,
            down_max_percent_per_step: self.down_max_percent,
            prewarm_window_steps: self.prewarm_window,
            rounding_mode: RoundingMode::parse(&self.rounding),
        }
    }

    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.horizon_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Snapshots older than this are marked stale. Defaults to twice the
    /// tick interval so one missed tick does not flap the header.
    pub fn stale_after(&self) -> Duration {
        if self.stale_after_secs > 0 {
            Duration::from_secs(self.stale_after_secs)
        } else {
            Duration::from_secs(self.interval_secs * 2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "kedastral-forecaster",
            "--workload",
            "web",
            "--metric",
            "rps",
            "--prom-query",
            "sum(rate(http_requests_total[1m]))",
        ]
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::parse_from(base_args());
        cfg.validate().unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8081");
        assert_eq!(cfg.horizon_secs, 1800);
        assert_eq!(cfg.model, "baseline");
        assert_eq!(cfg.stale_after(), Duration::from_secs(60));
    }

    #[test]
    fn explicit_stale_after_wins() {
        let mut args = base_args();
        args.extend(["--stale-after-secs", "90"]);
        let cfg = Config::parse_from(args);
        assert_eq!(cfg.stale_after(), Duration::from_secs(90));
    }

    #[test]
    fn rejects_unknown_model() {
        let mut args = base_args();
        args.extend(["--model", "prophet"]);
        let cfg = Config::parse_from(args);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_horizon_shorter_than_step() {
        let mut args = base_args();
        args.extend(["--horizon-secs", "30", "--step-secs", "60"]);
        let cfg = Config::parse_from(args);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_target_per_pod() {
        let mut args = base_args();
        args.extend(["--target-per-pod", "0"]);
        let cfg = Config::parse_from(args);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_maps_all_fields() {
        let mut args = base_args();
        args.extend([
            "--target-per-pod",
            "50",
            "--headroom",
            "1.5",
            "--min",
            "2",
            "--max",
            "20",
            "--rounding",
            "floor",
        ]);
        let cfg = Config::parse_from(args);
        let policy = cfg.policy();
        assert_eq!(policy.target_per_pod, 50.0);
        assert_eq!(policy.headroom, 1.5);
        assert_eq!(policy.min_replicas, 2);
        assert_eq!(policy.max_replicas, 20);
        assert_eq!(policy.rounding_mode, RoundingMode::Floor);
    }

    #[test]
    fn missing_required_flags_fail_parsing() {
        let result = Config::try_parse_from(["kedastral-forecaster"]);
        assert!(result.is_err());
    }
}
