//! JSON bodies exchanged between the server and the load generator

use crate::device::DeviceMode;
use serde::{Deserialize, Serialize};

/// `POST /process` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub ok: bool,
    /// Server-side processing latency in milliseconds
    pub latency_ms: f64,
    /// Device in effect when the request entered the simulator
    pub device: DeviceMode,
    pub pixels: String,
    pub iters: u32,
}

/// `GET /healthz` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub status: String,
    pub device: DeviceMode,
    pub speedup_factor: f64,
    /// Device toggles since the server started
    #[serde(default)]
    pub toggles: u64,
}

/// `POST /toggle-gpu-simulation` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub ok: bool,
    pub previous: DeviceMode,
    pub device: DeviceMode,
    pub gpu_simulation: bool,
}

/// `GET /gpu-simulation-status` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatusResponse {
    pub gpu_simulation: bool,
    pub device: DeviceMode,
    pub speedup_factor: f64,
}

/// Body of every 4xx/5xx answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
        }
    }
}
