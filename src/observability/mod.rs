//! Observability
//!
//! Prometheus metrics and structured access logging

pub mod access_log;
pub mod metrics;

pub use access_log::{AccessLog, AccessLogEntry};
pub use metrics::{MetricsSnapshot, ServiceMetrics, P95_GAUGE_NAME};
