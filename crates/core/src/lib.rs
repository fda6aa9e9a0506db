//! Core library for the kedastral predictive autoscaler
//!
//! This crate provides the building blocks shared by the forecaster and
//! scaler processes:
//! - Metric adapters that pull time-series windows from external systems
//! - The capacity planner converting forecasted load into replica counts
//! - Forecasting models (baseline EMA + seasonality, ARIMA)
//! - The snapshot store and forecast control loop
//! - The external-scaler protobuf types and forecaster HTTP client

pub mod adapters;
pub mod capacity;
pub mod client;
pub mod features;
pub mod forecaster;
pub mod models;
pub mod observability;
pub mod proto;
pub mod storage;

pub use capacity::{to_replicas, Policy, RoundingMode};
pub use forecaster::Forecaster;
pub use observability::ForecasterMetrics;
pub use storage::{MemoryStore, Snapshot, Store};
