//! Service metrics
//!
//! Lightweight counters, a latency histogram and the p95 gauge
//!
//! Provides in-process metrics tracking without external dependencies.
//! Metrics can be exported as JSON or rendered as Prometheus text format.

use crate::device::{DeviceMode, DeviceSnapshot};
use crate::gauge::RollingGauge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Name of the rolling p95 gauge exported on `/metrics`
pub const P95_GAUGE_NAME: &str = "app_request_latency_p95_seconds";

/// Histogram upper bounds in seconds
pub const LATENCY_BUCKETS: [f64; 9] = [0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Point-in-time view of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests per endpoint path
    pub endpoint_requests: BTreeMap<String, u64>,
    /// Total responses by status code class (2xx, 4xx, 5xx)
    pub status_classes: BTreeMap<String, u64>,
    /// Requests currently being handled
    pub in_flight: i64,
    /// Cumulative bucket counts, aligned with [`LATENCY_BUCKETS`]
    pub latency_buckets: Vec<u64>,
    /// Observations in the histogram
    pub latency_count: u64,
    /// Sum of observed latencies in seconds
    pub latency_sum_secs: f64,
}

/// Service metrics collector
pub struct ServiceMetrics {
    status_2xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    in_flight: AtomicI64,
    endpoint_requests: RwLock<BTreeMap<String, u64>>,
    /// Non-cumulative bucket counts; the last slot is `+Inf`
    buckets: [AtomicU64; LATENCY_BUCKETS.len() + 1],
    latency_count: AtomicU64,
    latency_sum_us: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            status_2xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
            endpoint_requests: RwLock::new(BTreeMap::new()),
            buckets: Default::default(),
            latency_count: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
        }
    }

    /// Count a request against its endpoint label
    pub fn record_request(&self, endpoint: &str) {
        let mut map = self
            .endpoint_requests
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *map.entry(endpoint.to_string()).or_insert(0) += 1;
    }

    /// Count a completed response by status class
    pub fn record_response(&self, status: u16) {
        match status / 100 {
            2 => {
                self.status_2xx.fetch_add(1, Ordering::Relaxed);
            }
            4 => {
                self.status_4xx.fetch_add(1, Ordering::Relaxed);
            }
            5 => {
                self.status_5xx.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    /// Observe one successful processing latency
    pub fn observe_latency(&self, secs: f64) {
        let idx = LATENCY_BUCKETS
            .iter()
            .position(|bound| secs <= *bound)
            .unwrap_or(LATENCY_BUCKETS.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us
            .fetch_add((secs * 1_000_000.0).round() as u64, Ordering::Relaxed);
    }

    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut status_classes = BTreeMap::new();
        status_classes.insert("2xx".to_string(), self.status_2xx.load(Ordering::Relaxed));
        status_classes.insert("4xx".to_string(), self.status_4xx.load(Ordering::Relaxed));
        status_classes.insert("5xx".to_string(), self.status_5xx.load(Ordering::Relaxed));

        let mut running = 0;
        let latency_buckets = self.buckets[..LATENCY_BUCKETS.len()]
            .iter()
            .map(|b| {
                running += b.load(Ordering::Relaxed);
                running
            })
            .collect();

        MetricsSnapshot {
            endpoint_requests: self
                .endpoint_requests
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            status_classes,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            latency_buckets,
            latency_count: self.latency_count.load(Ordering::Relaxed),
            latency_sum_secs: self.latency_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }

    /// Render metrics in Prometheus text exposition format
    ///
    /// The p95 gauge reads 0 while the window is empty. With a zero-capacity
    /// window it is declared but carries no sample.
    pub fn render_prometheus(&self, gauge: &RollingGauge, device: &DeviceSnapshot) -> String {
        let snap = self.snapshot();
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP {} p95 latency over the most recent {} successful requests\n",
            P95_GAUGE_NAME,
            gauge.capacity()
        ));
        output.push_str(&format!("# TYPE {} gauge\n", P95_GAUGE_NAME));
        if gauge.is_enabled() {
            let p95 = gauge.current_p95().unwrap_or(0.0);
            output.push_str(&format!("{} {}\n", P95_GAUGE_NAME, p95));
        }

        output.push_str("# HELP app_requests_total Total number of requests by endpoint\n");
        output.push_str("# TYPE app_requests_total counter\n");
        for (endpoint, count) in &snap.endpoint_requests {
            output.push_str(&format!(
                "app_requests_total{{endpoint=\"{}\"}} {}\n",
                endpoint, count
            ));
        }

        output.push_str("# HELP app_responses_total Total responses by status class\n");
        output.push_str("# TYPE app_responses_total counter\n");
        for (class, count) in &snap.status_classes {
            output.push_str(&format!(
                "app_responses_total{{status_class=\"{}\"}} {}\n",
                class, count
            ));
        }

        output.push_str("# HELP app_request_latency_seconds Processing latency of successful requests\n");
        output.push_str("# TYPE app_request_latency_seconds histogram\n");
        for (bound, count) in LATENCY_BUCKETS.iter().zip(&snap.latency_buckets) {
            output.push_str(&format!(
                "app_request_latency_seconds_bucket{{le=\"{}\"}} {}\n",
                bound, count
            ));
        }
        output.push_str(&format!(
            "app_request_latency_seconds_bucket{{le=\"+Inf\"}} {}\n",
            snap.latency_count
        ));
        output.push_str(&format!(
            "app_request_latency_seconds_sum {}\n",
            snap.latency_sum_secs
        ));
        output.push_str(&format!(
            "app_request_latency_seconds_count {}\n",
            snap.latency_count
        ));

        output.push_str("# HELP app_in_flight_requests Requests currently being handled\n");
        output.push_str("# TYPE app_in_flight_requests gauge\n");
        output.push_str(&format!("app_in_flight_requests {}\n", snap.in_flight));

        output.push_str("# HELP app_device_mode Active processing device (1 = active)\n");
        output.push_str("# TYPE app_device_mode gauge\n");
        for mode in [DeviceMode::Gpu, DeviceMode::Cpu] {
            output.push_str(&format!(
                "app_device_mode{{device=\"{}\"}} {}\n",
                mode,
                u8::from(mode == device.mode)
            ));
        }

        output
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
