//! In-memory snapshot store
//!
//! Backed by a concurrent map: one writer may coexist with many readers and
//! each `put` swaps the whole entry atomically. With a TTL configured, a
//! background task periodically evicts entries older than the TTL; readers
//! of an evicted key see "not found".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Snapshot, Store};

pub struct MemoryStore {
    entries: Arc<DashMap<String, Snapshot>>,
    shutdown: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// A store without expiry: entries live until overwritten.
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            entries: Arc::new(DashMap::new()),
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    /// A store whose entries expire `ttl` after their `generated_at`.
    /// Spawns the eviction task on the current runtime; `close` stops it.
    pub fn with_ttl(ttl: Duration) -> Self {
        let store = Self::new();
        if ttl.is_zero() {
            return store;
        }

        let entries = Arc::clone(&store.entries);
        let mut shutdown = store.shutdown.subscribe();
        let period = (ttl / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let cutoff = Utc::now()
                            - chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
                        let before = entries.len();
                        entries.retain(|_, snapshot| snapshot.generated_at >= cutoff);
                        let evicted = before.saturating_sub(entries.len());
                        if evicted > 0 {
                            debug!(evicted, "evicted expired snapshots");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
        store
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, snapshot: Snapshot) -> Result<()> {
        if snapshot.workload.is_empty() {
            bail!("workload cannot be empty");
        }
        self.entries.insert(snapshot.workload.clone(), snapshot);
        Ok(())
    }

    async fn get_latest(&self, workload: &str) -> Result<Option<Snapshot>> {
        Ok(self.entries.get(workload).map(|entry| entry.clone()))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown.send(());
        }
    }
}
