//! Snapshot storage
//!
//! A [`Store`] keeps the latest forecast [`Snapshot`] per workload with
//! last-writer-wins semantics. The in-memory implementation is the default;
//! a distributed backend only needs to satisfy the same three operations.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Atomic bundle of forecast values and the derived replica plan, timestamped
/// and keyed by workload. Readers always observe a fully populated snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub workload: String,
    pub metric: String,
    pub generated_at: DateTime<Utc>,
    pub step_seconds: u64,
    pub horizon_seconds: u64,
    pub values: Vec<f64>,
    pub desired_replicas: Vec<i64>,
}

/// Keyed latest-write snapshot store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Replace the snapshot for the snapshot's workload. Rejects an empty
    /// workload name.
    async fn put(&self, snapshot: Snapshot) -> Result<()>;

    /// The latest snapshot for the workload, if any.
    async fn get_latest(&self, workload: &str) -> Result<Option<Snapshot>>;

    /// Release background resources. Idempotent; the default is a no-op.
    async fn close(&self) {}
}
