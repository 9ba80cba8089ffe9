//! # rtc-gpu-media
//!
//! Latency benchmarking for a simulated GPU media processing service, with a
//! rolling p95 gauge exported for autoscalers.
//!
//! ## Architecture
//!
//! ```text
//! load (closed-loop workers) → POST /process → ProcessingSimulator ─┬→ RollingGauge → /metrics
//!          │                                       ↑ DeviceState    │
//!          └── samples → stats → report ←──────────┘                └→ response {latency_ms, device}
//! ```
//!
//! ## Core Features
//!
//! - **Processing simulator**: latency grows with pixels × iterations, divided
//!   by the speedup factor while the device is in `gpu` mode
//! - **Device state**: lock-free snapshots, one serialized toggle path
//! - **Rolling gauge**: fixed-capacity trailing window, nearest-rank p95
//! - **Closed-loop load generator**: bounded concurrency, one sample per attempt
//! - **Comparison reporter**: sequential cpu and gpu runs with restored state
//! - **Workload sweep**: small, medium and large frames under the current mode
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rtc_gpu_media::{config::ServerConfig, Server};
//!
//! #[tokio::main]
//! async fn main() -> rtc_gpu_media::Result<()> {
//!     let server = Server::new(ServerConfig::from_file("server.hcl").await?)?;
//!     server.start().await?;
//!     server.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod gauge;
pub mod loadgen;
pub mod observability;
pub mod report;
pub mod server;
pub mod simulator;
pub mod stats;
pub mod workload;

// Re-export main types
pub use client::TargetClient;
pub use device::{DeviceMode, DeviceSnapshot, DeviceState};
pub use error::{BenchError, Result};
pub use gauge::RollingGauge;
pub use loadgen::{LoadTestRun, RequestSample, SealedRun};
pub use report::{ComparisonReport, ComparisonReporter, RunReport, SweepReport, WorkloadSweep};
pub use server::Server;
pub use stats::PercentileSummary;
pub use workload::WorkloadDescriptor;

use serde::{Deserialize, Serialize};

/// Server runtime state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// Components built, listener not bound yet
    #[default]
    Created,
    /// Binding the listener
    Starting,
    /// Accepting and handling requests
    Running,
    /// Listener closed, draining in-flight requests
    Stopping,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Load test run lifecycle. `Completed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    /// Workers are issuing requests
    Running,
    /// Every worker exited after the termination condition was met
    Completed,
    /// A precondition failed or a worker crashed
    Aborted,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
