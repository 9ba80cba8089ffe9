//! Workload descriptor
//!
//! The unit of simulated work carried by `/process`

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upper bounds a workload is validated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_iterations: u32,
}

impl Default for WorkloadLimits {
    fn default() -> Self {
        Self {
            max_width: 7680,
            max_height: 4320,
            max_iterations: 100,
        }
    }
}

/// Frame size and iteration count for one processing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub width: u32,
    pub height: u32,
    pub iteration_count: u32,
}

impl WorkloadDescriptor {
    pub fn new(width: u32, height: u32, iteration_count: u32) -> Self {
        Self {
            width,
            height,
            iteration_count,
        }
    }

    /// Parse `WxH` (or `WXH`) plus an iteration count
    pub fn parse(pixels: &str, iteration_count: u32) -> Result<Self> {
        let (width, height) = parse_pixels(pixels)?;
        Ok(Self::new(width, height, iteration_count))
    }

    /// Reject zero dimensions or a zero iteration count
    pub fn validate_positive(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BenchError::Config(format!(
                "pixels must be positive, got {}",
                self.pixels()
            )));
        }
        if self.iteration_count == 0 {
            return Err(BenchError::Config("iters must be at least 1".into()));
        }
        Ok(())
    }

    /// Reject non-positive dimensions and anything above `limits`
    pub fn validate(&self, limits: &WorkloadLimits) -> Result<()> {
        self.validate_positive()?;
        if self.width > limits.max_width || self.height > limits.max_height {
            return Err(BenchError::Config(format!(
                "pixels {} exceed the {}x{} limit",
                self.pixels(),
                limits.max_width,
                limits.max_height
            )));
        }
        if self.iteration_count > limits.max_iterations {
            return Err(BenchError::Config(format!(
                "iters {} exceeds the limit of {}",
                self.iteration_count, limits.max_iterations
            )));
        }
        Ok(())
    }

    /// `width * height * iteration_count`
    pub fn cost_units(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.iteration_count as u64
    }

    /// `WxH` form used on the wire
    pub fn pixels(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl Default for WorkloadDescriptor {
    fn default() -> Self {
        Self::new(1280, 720, 5)
    }
}

impl std::fmt::Display for WorkloadDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x{} iters", self.pixels(), self.iteration_count)
    }
}

/// Parse a `1280x720` style frame size
pub fn parse_pixels(s: &str) -> Result<(u32, u32)> {
    let invalid = || BenchError::Config(format!("pixels must be like 1280x720, got '{}'", s));
    let (w, h) = s.split_once(|c| c == 'x' || c == 'X').ok_or_else(invalid)?;
    if w.is_empty() || h.is_empty() || !w.bytes().chain(h.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let width = u32::from_str(w).map_err(|_| invalid())?;
    let height = u32::from_str(h).map_err(|_| invalid())?;
    Ok((width, height))
}
