//! Latency aggregator
//!
//! Percentile summaries over a sealed load-test run
//!
//! Percentiles use the nearest-rank rule: sort ascending, take the sample at
//! rank `ceil(p * n)` (1-indexed) clamped to `[1, n]`. No interpolation. The
//! rolling gauge uses the same rule so client and server numbers agree.
//!
//! Percentiles and means are computed over successful attempts only. With
//! zero successes they are `None` ("no data"), never zero or NaN, while the
//! success rate and throughput still count every attempt.

use crate::device::DeviceMode;
use crate::error::{BenchError, Result};
use crate::loadgen::{FailureKind, SealedRun};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Nearest-rank percentile of an ascending-sorted slice. `p` is in `[0, 1]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (p * n as f64).ceil() as usize;
    let rank = rank.clamp(1, n);
    Some(sorted[rank - 1])
}

/// Sort latencies ascending; NaNs sort last
pub fn sort_latencies(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

/// Distribution of a set of latencies, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencyStats {
    /// `None` when `values` is empty
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        sort_latencies(&mut values);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self {
            p50: percentile(&values, 0.50)?,
            p95: percentile(&values, 0.95)?,
            p99: percentile(&values, 0.99)?,
            mean,
            min: values[0],
            max: values[values.len() - 1],
        })
    }
}

/// Summary of one sealed run. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileSummary {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    /// `successes / total`, in `[0, 1]`
    pub success_rate: f64,
    /// Attempts (including failures) per second of wall-clock run time
    pub requests_per_second: f64,
    /// Wall-clock time from first dispatch to last completion
    pub wall_clock: Duration,
    /// Client-observed latency of successful attempts
    pub latency: Option<LatencyStats>,
    /// Server-reported processing latency of successful attempts
    pub server_latency: Option<LatencyStats>,
    /// Successful attempts per device label
    pub device_usage: BTreeMap<DeviceMode, u64>,
    /// Failed attempts per failure kind
    pub failure_breakdown: BTreeMap<String, u64>,
}

impl PercentileSummary {
    pub fn p50(&self) -> Option<f64> {
        self.latency.map(|l| l.p50)
    }

    pub fn p95(&self) -> Option<f64> {
        self.latency.map(|l| l.p95)
    }

    pub fn p99(&self) -> Option<f64> {
        self.latency.map(|l| l.p99)
    }

    pub fn mean(&self) -> Option<f64> {
        self.latency.map(|l| l.mean)
    }

    /// Mean latency, or an aggregation error when there were no successes
    pub fn require_mean(&self) -> Result<f64> {
        self.mean().ok_or_else(|| {
            BenchError::Aggregation(format!(
                "no successful samples out of {} attempts",
                self.total
            ))
        })
    }

    pub fn has_data(&self) -> bool {
        self.latency.is_some()
    }
}

/// Summarize every sample of a sealed run
pub fn summarize(run: &SealedRun) -> PercentileSummary {
    summarize_where(run, |_| true)
}

/// Summaries split by the device label of each sample. Failed attempts with
/// no label are not attributed to any device.
pub fn summarize_by_device(run: &SealedRun) -> BTreeMap<DeviceMode, PercentileSummary> {
    let mut devices: Vec<DeviceMode> = run.samples().iter().filter_map(|s| s.device_used).collect();
    devices.sort();
    devices.dedup();
    devices
        .into_iter()
        .map(|d| (d, summarize_where(run, |s| s.device_used == Some(d))))
        .collect()
}

fn summarize_where(
    run: &SealedRun,
    keep: impl Fn(&crate::loadgen::RequestSample) -> bool,
) -> PercentileSummary {
    let mut total = 0u64;
    let mut client = Vec::new();
    let mut server = Vec::new();
    let mut device_usage = BTreeMap::new();
    let mut failure_breakdown = BTreeMap::new();

    for sample in run.samples().iter().filter(|s| keep(s)) {
        total += 1;
        match sample.failure() {
            None => {
                client.push(sample.latency_ms());
                if let Some(ms) = sample.server_latency_ms {
                    server.push(ms);
                }
                if let Some(device) = sample.device_used {
                    *device_usage.entry(device).or_insert(0) += 1;
                }
            }
            Some(kind) => {
                *failure_breakdown.entry(failure_label(kind)).or_insert(0) += 1;
            }
        }
    }

    let successes = client.len() as u64;
    let wall_clock = run.wall_clock();
    let secs = wall_clock.as_secs_f64();

    PercentileSummary {
        total,
        successes,
        failures: total - successes,
        success_rate: if total == 0 { 0.0 } else { successes as f64 / total as f64 },
        requests_per_second: if secs > 0.0 { total as f64 / secs } else { 0.0 },
        wall_clock,
        latency: LatencyStats::from_values(client),
        server_latency: LatencyStats::from_values(server),
        device_usage,
        failure_breakdown,
    }
}

fn failure_label(kind: &FailureKind) -> String {
    match kind {
        FailureKind::Status(code) => format!("HTTP {}", code),
        other => other.to_string(),
    }
}
