//! Scaler configuration

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "kedastral-scaler", version, about = "Kedastral KEDA external scaler")]
pub struct Config {
    /// gRPC listen address
    #[arg(long, env = "SCALER_LISTEN", default_value = "0.0.0.0:50051")]
    pub listen: String,

    /// Auxiliary HTTP listen address (health and metrics)
    #[arg(long = "http-listen", env = "SCALER_HTTP_LISTEN", default_value = "0.0.0.0:8082")]
    pub http_listen: String,

    /// Forecaster HTTP endpoint
    #[arg(
        long = "forecaster-url",
        env = "FORECASTER_URL",
        default_value = "http://localhost:8081"
    )]
    pub forecaster_url: String,

    /// Lead time for forecast selection, in seconds
    #[arg(long = "lead-time-secs", env = "LEAD_TIME_SECS", default_value_t = 300)]
    pub lead_time_secs: u64,

    /// Snapshots older than this trigger the fallback, in seconds
    #[arg(long = "stale-after-secs", env = "STALE_AFTER_SECS", default_value_t = 60)]
    pub stale_after_secs: u64,

    /// Replica count returned when no usable snapshot is available
    #[arg(long = "default-min", env = "DEFAULT_MIN_REPLICAS", default_value_t = 1)]
    pub default_min: i64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.forecaster_url.is_empty() {
            bail!("--forecaster-url is required");
        }
        if self.default_min < 0 {
            bail!("--default-min must not be negative");
        }
        Ok(())
    }

    pub fn lead_time(&self) -> Duration {
        Duration::from_secs(self.lead_time_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}
