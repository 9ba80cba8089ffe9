//! Device state
//!
//! Process-wide simulated device mode
//!
//! A single-owner cell holding the current [`DeviceSnapshot`]. Readers take a
//! lock-free snapshot of the whole value (mode and speedup factor together),
//! so a request never observes a torn or mid-flight change. Writers are
//! serialized through one mutex-guarded path.

use crate::error::{BenchError, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Simulated processing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Accelerated path; latency divided by the speedup factor
    Gpu,
    /// Baseline path
    Cpu,
}

impl DeviceMode {
    /// The other mode
    pub fn toggled(self) -> Self {
        match self {
            Self::Gpu => Self::Cpu,
            Self::Cpu => Self::Gpu,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpu" | "cuda" | "cuda-simulated" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => Err(BenchError::Config(format!(
                "unknown device mode '{}', expected 'gpu' or 'cpu'",
                other
            ))),
        }
    }
}

/// Point-in-time view of the device state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub mode: DeviceMode,
    pub speedup_factor: f64,
}

impl DeviceSnapshot {
    /// Divisor applied to the baseline latency for this snapshot
    pub fn latency_divisor(&self) -> f64 {
        match self.mode {
            DeviceMode::Gpu => self.speedup_factor,
            DeviceMode::Cpu => 1.0,
        }
    }
}

/// Process-wide device state
pub struct DeviceState {
    current: ArcSwap<DeviceSnapshot>,
    write_lock: Mutex<()>,
    toggles: AtomicU64,
}

impl DeviceState {
    /// Create a new device state. The speedup factor must be finite and `>= 1`.
    pub fn new(mode: DeviceMode, speedup_factor: f64) -> Result<Self> {
        if !speedup_factor.is_finite() || speedup_factor < 1.0 {
            return Err(BenchError::Config(format!(
                "speedup_factor must be a finite number >= 1, got {}",
                speedup_factor
            )));
        }
        Ok(Self {
            current: ArcSwap::from_pointee(DeviceSnapshot {
                mode,
                speedup_factor,
            }),
            write_lock: Mutex::new(()),
            toggles: AtomicU64::new(0),
        })
    }

    /// Lock-free snapshot of the current state
    pub fn snapshot(&self) -> DeviceSnapshot {
        **self.current.load()
    }

    /// Current mode
    pub fn mode(&self) -> DeviceMode {
        self.snapshot().mode
    }

    /// Flip the mode and return the new snapshot
    pub fn toggle(&self) -> DeviceSnapshot {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = self.snapshot();
        let next = DeviceSnapshot {
            mode: prev.mode.toggled(),
            ..prev
        };
        self.current.store(Arc::new(next));
        self.toggles.fetch_add(1, Ordering::Relaxed);
        tracing::info!(from = %prev.mode, to = %next.mode, "Device mode toggled");
        next
    }

    /// Number of mode changes since start
    pub fn toggle_count(&self) -> u64 {
        self.toggles.load(Ordering::Relaxed)
    }
}
