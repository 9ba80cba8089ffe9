//! Structured access log
//!
//! One JSON line per handled request
//!
//! Entries are emitted under the `access_log` tracing target so they can be
//! filtered independently, e.g. `RUST_LOG=info,access_log=off`.

use crate::device::DeviceMode;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A single access log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    /// Raw query string, if any
    pub query: Option<String>,
    pub status: u16,
    /// Wall time spent in the handler, in milliseconds
    pub duration_ms: f64,
    /// Device that served a `/process` request
    pub device: Option<DeviceMode>,
    pub user_agent: Option<String>,
}

pub struct AccessLog {
    total_entries: AtomicU64,
}

impl AccessLog {
    pub fn new() -> Self {
        Self {
            total_entries: AtomicU64::new(0),
        }
    }

    /// Start tracking a request
    pub fn start_request<B>(&self, req: &hyper::Request<B>, remote_addr: SocketAddr) -> RequestTracker {
        RequestTracker {
            start: Instant::now(),
            client_ip: remote_addr.ip().to_string(),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            user_agent: req
                .headers()
                .get(http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Record and emit a log entry
    pub fn record(&self, entry: &AccessLogEntry) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "access_log",
            client_ip = entry.client_ip,
            method = entry.method,
            path = entry.path,
            status = entry.status,
            duration_ms = entry.duration_ms,
            device = entry.device.map(DeviceMode::as_str).unwrap_or("-"),
            "{}",
            serde_json::to_string(entry).unwrap_or_default()
        );
    }

    pub fn total_entries(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Request attributes captured on arrival, completed once the response is known
pub struct RequestTracker {
    start: Instant,
    client_ip: String,
    method: String,
    path: String,
    query: Option<String>,
    user_agent: Option<String>,
}

impl RequestTracker {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn finish(self, status: u16, device: Option<DeviceMode>) -> AccessLogEntry {
        AccessLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            duration_ms: self.elapsed_ms(),
            client_ip: self.client_ip,
            method: self.method,
            path: self.path,
            query: self.query,
            status,
            device,
            user_agent: self.user_agent,
        }
    }
}
