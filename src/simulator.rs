//! Processing simulator
//!
//! Deterministic latency model standing in for GPU work
//!
//! Each request reads the device state exactly once at entry, so the device
//! label it returns is the mode in effect at dispatch even if a toggle lands
//! while it sleeps. No lock is held across the simulated delay: the only
//! critical sections are the device snapshot and the gauge append.

use crate::config::SimulatorConfig;
use crate::device::{DeviceMode, DeviceSnapshot, DeviceState};
use crate::error::{BenchError, Result};
use crate::gauge::RollingGauge;
use crate::workload::{WorkloadDescriptor, WorkloadLimits};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A validated request with its device snapshot and planned delay
#[derive(Debug, Clone, Copy)]
pub struct SimulatedJob {
    pub workload: WorkloadDescriptor,
    pub device: DeviceSnapshot,
    pub latency: Duration,
}

/// Result of one processed request
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProcessOutcome {
    pub workload: WorkloadDescriptor,
    pub device: DeviceMode,
    /// Modeled delay including jitter
    pub planned: Duration,
    /// Measured time from entry to completion; this is what the gauge sees
    pub latency: Duration,
}

pub struct ProcessingSimulator {
    config: SimulatorConfig,
    limits: WorkloadLimits,
    device: Arc<DeviceState>,
    gauge: Arc<RollingGauge>,
    /// Valid requests seen, drives failure injection
    accepted: AtomicU64,
}

impl ProcessingSimulator {
    pub fn new(config: SimulatorConfig, device: Arc<DeviceState>, gauge: Arc<RollingGauge>) -> Self {
        let limits = config.limits();
        Self {
            config,
            limits,
            device,
            gauge,
            accepted: AtomicU64::new(0),
        }
    }

    pub fn device(&self) -> &Arc<DeviceState> {
        &self.device
    }

    pub fn gauge(&self) -> &Arc<RollingGauge> {
        &self.gauge
    }

    pub fn limits(&self) -> &WorkloadLimits {
        &self.limits
    }

    /// Baseline (cpu) latency in milliseconds, before jitter
    pub fn baseline_latency_ms(&self, workload: &WorkloadDescriptor) -> f64 {
        let megapixel_iterations = workload.cost_units() as f64 / 1_000_000.0;
        self.config.base_latency_ms + self.config.ms_per_megapixel_iteration * megapixel_iterations
    }

    /// Modeled latency for a device snapshot, before jitter
    pub fn model_latency(&self, workload: &WorkloadDescriptor, device: &DeviceSnapshot) -> Duration {
        let ms = self.baseline_latency_ms(workload) / device.latency_divisor();
        Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }

    /// Validate, snapshot the device and compute the delay. Never sleeps.
    pub fn plan(&self, workload: WorkloadDescriptor) -> Result<SimulatedJob> {
        workload.validate(&self.limits)?;

        let device = self.device.snapshot();

        if self.should_inject_failure() {
            return Err(BenchError::ServerProcessing {
                status: 503,
                message: "injected processing failure".into(),
            });
        }

        let base = self.model_latency(&workload, &device);
        Ok(SimulatedJob {
            workload,
            device,
            latency: base.mul_f64(self.jitter_factor()),
        })
    }

    /// Run one request end to end and feed the measured latency to the gauge
    pub async fn process(&self, workload: WorkloadDescriptor) -> Result<ProcessOutcome> {
        let start = Instant::now();
        let job = self.plan(workload)?;

        tokio::time::sleep(job.latency).await;

        let latency = start.elapsed();
        self.gauge.append(latency.as_secs_f64());

        tracing::debug!(
            device = %job.device.mode,
            pixels = %job.workload.pixels(),
            iters = job.workload.iteration_count,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "Processed request"
        );

        Ok(ProcessOutcome {
            workload: job.workload,
            device: job.device.mode,
            planned: job.latency,
            latency,
        })
    }

    fn jitter_factor(&self) -> f64 {
        let j = self.config.jitter_ratio;
        if j <= 0.0 {
            return 1.0;
        }
        1.0 + rand::thread_rng().gen_range(-j..=j)
    }

    /// Spread failures evenly: request `n` fails when `floor((n + 1) * rate)`
    /// steps past `floor(n * rate)`.
    fn should_inject_failure(&self) -> bool {
        let rate = self.config.failure_rate;
        if rate <= 0.0 {
            return false;
        }
        let n = self.accepted.fetch_add(1, Ordering::Relaxed) as f64;
        ((n + 1.0) * rate).floor() > (n * rate).floor()
    }
}
