//! Scaler service library
//!
//! Exposes the gRPC service implementation, configuration, metrics and the
//! auxiliary HTTP router so integration tests can exercise the same code the
//! binary serves.

pub mod config;
pub mod metrics;
pub mod router;
pub mod scaler;
