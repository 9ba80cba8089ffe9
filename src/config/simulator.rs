//! Simulator, device and gauge configuration blocks

use crate::device::DeviceMode;
use crate::workload::WorkloadLimits;
use serde::{Deserialize, Serialize};

/// Initial device state
///
/// # Example
///
/// ```hcl
/// device {
///   mode           = "gpu"
///   speedup_factor = 8.0
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Mode at process start (default: gpu)
    #[serde(default = "default_mode")]
    pub mode: DeviceMode,

    /// Latency divisor applied in gpu mode (default: 8.0)
    #[serde(default = "default_speedup")]
    pub speedup_factor: f64,
}

fn default_mode() -> DeviceMode {
    DeviceMode::Gpu
}

fn default_speedup() -> f64 {
    8.0
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            speedup_factor: default_speedup(),
        }
    }
}

/// Latency model and request limits for the processing simulator
///
/// Baseline latency is
/// `base_latency_ms + ms_per_megapixel_iteration * (width * height / 1e6) * iters`,
/// divided by the speedup factor in gpu mode, then scaled by a uniform
/// jitter in `[1 - jitter_ratio, 1 + jitter_ratio]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Fixed per-request cost in milliseconds (default: 10.0)
    #[serde(default = "default_base_latency")]
    pub base_latency_ms: f64,

    /// Cost of one iteration over one megapixel (default: 40.0)
    #[serde(default = "default_ms_per_mpx_iter")]
    pub ms_per_megapixel_iteration: f64,

    /// Relative jitter bound, `0.0..=0.5` (default: 0.05)
    #[serde(default = "default_jitter")]
    pub jitter_ratio: f64,

    #[serde(default = "default_max_width")]
    pub max_width: u32,

    #[serde(default = "default_max_height")]
    pub max_height: u32,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Fraction of valid requests answered with 503 before any work (default: 0.0)
    #[serde(default)]
    pub failure_rate: f64,
}

// Default 1280x720x5 plans ~194ms on cpu and ~24ms on gpu at 8x. The gpu path
// must stay well above the 1ms timer resolution.
fn default_base_latency() -> f64 {
    10.0
}

fn default_ms_per_mpx_iter() -> f64 {
    40.0
}

fn default_jitter() -> f64 {
    0.05
}

fn default_max_width() -> u32 {
    WorkloadLimits::default().max_width
}

fn default_max_height() -> u32 {
    WorkloadLimits::default().max_height
}

fn default_max_iterations() -> u32 {
    WorkloadLimits::default().max_iterations
}

impl SimulatorConfig {
    pub fn limits(&self) -> WorkloadLimits {
        WorkloadLimits {
            max_width: self.max_width,
            max_height: self.max_height,
            max_iterations: self.max_iterations,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_latency_ms: default_base_latency(),
            ms_per_megapixel_iteration: default_ms_per_mpx_iter(),
            jitter_ratio: default_jitter(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            max_iterations: default_max_iterations(),
            failure_rate: 0.0,
        }
    }
}

/// Rolling latency gauge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaugeConfig {
    /// Trailing window length; 0 disables the gauge (default: 512)
    #[serde(default = "default_gauge_capacity")]
    pub capacity: usize,
}

fn default_gauge_capacity() -> usize {
    512
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            capacity: default_gauge_capacity(),
        }
    }
}
