//! Load-test configuration
//!
//! Built from CLI flags, validated before any request

use crate::error::{BenchError, Result};
use crate::workload::WorkloadDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a run stops issuing new requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Stop after this many attempts have been dispatched
    Requests(u64),
    /// Stop dispatching once this much wall-clock time has elapsed
    Duration(Duration),
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requests(n) => write!(f, "{} requests", n),
            Self::Duration(d) => write!(f, "{:.1}s", d.as_secs_f64()),
        }
    }
}

/// Closed-loop load test parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Base URL of the target service
    pub target: String,
    /// Number of worker slots, each with at most one request in flight
    pub concurrency: usize,
    pub termination: Termination,
    pub workload: WorkloadDescriptor,
    /// Per-attempt deadline; a timed-out attempt records this as its latency
    pub timeout: Duration,
    /// Log progress every N completed attempts
    pub progress_every: u64,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            target: "http://localhost:8080".to_string(),
            concurrency: 10,
            termination: Termination::Requests(50),
            workload: WorkloadDescriptor::default(),
            timeout: Duration::from_secs(30),
            progress_every: 10,
        }
    }
}

impl LoadTestConfig {
    /// Fail fast on anything that would make the run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BenchError::Config("concurrency must be greater than 0".into()));
        }
        let url = reqwest::Url::parse(&self.target).map_err(|e| {
            BenchError::Config(format!("malformed target URL '{}': {}", self.target, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(BenchError::Config(format!(
                "target must be an http(s) URL with a host, got '{}'",
                self.target
            )));
        }
        match self.termination {
            Termination::Requests(0) => {
                return Err(BenchError::Config("requests must be greater than 0".into()))
            }
            Termination::Duration(d) if d.is_zero() => {
                return Err(BenchError::Config("duration must be greater than 0".into()))
            }
            _ => {}
        }
        if self.timeout.is_zero() {
            return Err(BenchError::Config("timeout must be greater than 0".into()));
        }
        // Upper bounds belong to the server; oversized workloads come back as 400 samples
        self.workload.validate_positive()
    }

    /// Target URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.target.trim_end_matches('/')
    }
}
