//! Centralized error types for rtc-gpu-media
//!
//! Per-attempt failures during a load test are not errors: they are recorded
//! on the sample as [`crate::loadgen::FailureKind`]. Everything here either
//! stops a run before it starts, aborts it, or is returned by the server
//! surface and configuration layer.

use crate::device::DeviceMode;
use thiserror::Error;

/// Crate error types
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid configuration, CLI flags or workload parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure outside of a recorded attempt (e.g. a control request)
    #[error("Network error: {0}")]
    Network(String),

    /// Target could not be reached before any worker started
    #[error("Target unreachable: {0}")]
    Unreachable(String),

    /// The target rejected or failed a control request
    #[error("Server processing error (HTTP {status}): {message}")]
    ServerProcessing { status: u16, message: String },

    /// A numeric statistic was requested from a summary with no data
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Device state did not match what an operation required
    #[error("State error: {0}")]
    State(String),

    /// A running load test moved to the aborted state
    #[error("Load test aborted: {0}")]
    RunAborted(String),

    /// One leg of a comparison failed; no speedup is reported
    #[error("Comparison aborted while running the {profile} profile: {source}")]
    ComparisonAborted {
        profile: DeviceMode,
        #[source]
        source: Box<BenchError>,
    },

    /// One case of a workload sweep failed
    #[error("Workload sweep aborted at the {case} case: {source}")]
    SweepAborted {
        case: String,
        #[source]
        source: Box<BenchError>,
    },

    /// HTTP client failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, BenchError>;
