//! Configuration types for rtc-gpu-media
//!
//! The server reads HCL (HashiCorp Configuration Language); the load
//! generator is configured from CLI flags into [`LoadTestConfig`].

mod load;
mod simulator;

pub use load::{LoadTestConfig, Termination};
pub use simulator::{DeviceConfig, GaugeConfig, SimulatorConfig};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{BenchError, Result};

/// Largest accepted rolling window; the window is allocated up front
pub const MAX_GAUGE_CAPACITY: usize = 1_000_000;

/// Top-level server configuration
///
/// # HCL Example
///
/// ```hcl
/// listen = "0.0.0.0:8080"
///
/// device {
///   mode           = "gpu"
///   speedup_factor = 8.0
/// }
///
/// simulator {
///   base_latency_ms            = 10.0
///   ms_per_megapixel_iteration = 40.0
///   jitter_ratio               = 0.05
///   failure_rate               = 0.0
/// }
///
/// gauge {
///   capacity = 512
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address in "host:port" format
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub gauge: GaugeConfig,

    /// Graceful shutdown timeout in seconds (default: 30)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl ServerConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            BenchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| BenchError::Config(format!("Failed to parse HCL config: {}", e)))
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.listen.parse::<SocketAddr>().map_err(|e| {
            BenchError::Config(format!("Invalid listen address '{}': {}", self.listen, e))
        })?;

        if !self.device.speedup_factor.is_finite() || self.device.speedup_factor < 1.0 {
            return Err(BenchError::Config(format!(
                "device.speedup_factor must be >= 1, got {}",
                self.device.speedup_factor
            )));
        }

        let sim = &self.simulator;
        if !sim.base_latency_ms.is_finite() || sim.base_latency_ms < 0.0 {
            return Err(BenchError::Config(
                "simulator.base_latency_ms must be >= 0".into(),
            ));
        }
        // Latency must grow with every workload dimension
        if !sim.ms_per_megapixel_iteration.is_finite() || sim.ms_per_megapixel_iteration <= 0.0 {
            return Err(BenchError::Config(
                "simulator.ms_per_megapixel_iteration must be > 0".into(),
            ));
        }
        if !(0.0..=0.5).contains(&sim.jitter_ratio) {
            return Err(BenchError::Config(format!(
                "simulator.jitter_ratio must be within [0, 0.5], got {}",
                sim.jitter_ratio
            )));
        }
        if !(0.0..=1.0).contains(&sim.failure_rate) {
            return Err(BenchError::Config(format!(
                "simulator.failure_rate must be within [0, 1], got {}",
                sim.failure_rate
            )));
        }
        if sim.max_width == 0 || sim.max_height == 0 || sim.max_iterations == 0 {
            return Err(BenchError::Config(
                "simulator limits must be greater than 0".into(),
            ));
        }
        if self.gauge.capacity > MAX_GAUGE_CAPACITY {
            return Err(BenchError::Config(format!(
                "gauge.capacity must be at most {}, got {}",
                MAX_GAUGE_CAPACITY, self.gauge.capacity
            )));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            device: DeviceConfig::default(),
            simulator: SimulatorConfig::default(),
            gauge: GaugeConfig::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}
