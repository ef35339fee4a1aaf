//! # Status and Metrics
//!
//! Shared lifecycle status and metrics types reported by the repeater engine
//! and its dispatchers.

mod metrics;
mod status;

pub use metrics::MetricsPayload;
pub use status::ModuleStatus;
