//! Data source adapters
//!
//! Adapters retrieve metrics from external systems and normalize them into a
//! common [`DataFrame`] shape for the forecast engine. They focus on pulling
//! raw data; feature building and forecasting live in the upper layers.

mod prometheus;

pub use prometheus::PrometheusAdapter;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One heterogeneous record, e.g. `{"ts": "...", "value": 42.0}`.
pub type Row = HashMap<String, Value>;

/// An ordered sequence of rows, immutable once returned by an adapter.
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    pub rows: Vec<Row>,
}

/// A source of recent metric samples.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Fetch the last `window_seconds` worth of data.
    async fn collect(&self, window_seconds: u64) -> Result<DataFrame>;

    /// Adapter identifier for logs and metrics.
    fn name(&self) -> &str;
}
