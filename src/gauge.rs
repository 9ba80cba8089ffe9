//! Rolling latency gauge
//!
//! Trailing window of completed-request latencies
//!
//! Backs the `app_request_latency_p95_seconds` gauge read by the external
//! autoscaler. The window is a fixed arena with a write cursor: appends
//! overwrite the oldest slot once full. Reads copy the live slots out under
//! the lock and sort/compute on the copy, so a scrape holds the lock only for
//! the copy and never sees a half-written buffer.

use crate::stats::{percentile, sort_latencies};
use std::sync::{Mutex, PoisonError};

/// Fixed-capacity FIFO of raw latencies (seconds)
#[derive(Debug, Clone)]
pub struct RollingWindow {
    slots: Vec<f64>,
    capacity: usize,
    /// Next slot to write
    cursor: usize,
    len: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity],
            capacity,
            cursor: 0,
            len: 0,
        }
    }

    /// Insert, evicting the oldest entry when full. No-op at capacity 0.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Contents oldest-first
    pub fn to_vec(&self) -> Vec<f64> {
        if self.len < self.capacity {
            return self.slots[..self.len].to_vec();
        }
        let mut out = Vec::with_capacity(self.len);
        out.extend_from_slice(&self.slots[self.cursor..]);
        out.extend_from_slice(&self.slots[..self.cursor]);
        out
    }
}

/// Thread-safe rolling gauge shared by every in-flight request
pub struct RollingGauge {
    window: Mutex<RollingWindow>,
    capacity: usize,
}

impl RollingGauge {
    /// A capacity of 0 disables aggregation entirely
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Mutex::new(RollingWindow::new(capacity)),
            capacity,
        }
    }

    /// Whether the gauge aggregates anything at all
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a completed request's latency in seconds
    pub fn append(&self, latency_secs: f64) {
        if !self.is_enabled() {
            return;
        }
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(latency_secs);
    }

    /// Point-in-time copy of the window, oldest first
    pub fn snapshot(&self) -> Vec<f64> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.window.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nearest-rank p95 of the current window; `None` when empty or disabled
    pub fn current_p95(&self) -> Option<f64> {
        self.current_percentile(0.95)
    }

    pub fn current_percentile(&self, p: f64) -> Option<f64> {
        let mut values = self.snapshot();
        sort_latencies(&mut values);
        percentile(&values, p)
    }
}
