//! HTTP client for the processing service
//!
//! Used by the load generator for `/process` attempts and by the comparison
//! reporter for health checks and device toggles.

use crate::device::DeviceMode;
use crate::error::{BenchError, Result};
use crate::loadgen::target::classify;
use crate::loadgen::FailureKind;
use crate::server::{DeviceStatusResponse, ErrorResponse, HealthResponse, ProcessResponse, ToggleResponse};
use crate::workload::WorkloadDescriptor;
use std::time::Duration;

/// Deadline for health checks and toggles
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct TargetClient {
    client: reqwest::Client,
    base_url: String,
}

impl TargetClient {
    /// `timeout` bounds each `/process` attempt
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(CONTROL_TIMEOUT))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /healthz`; any failure means the target is unreachable
    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self
            .client
            .get(self.url("/healthz"))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .map_err(|e| BenchError::Unreachable(format!("{}: {}", self.base_url, e)))?;
        if !resp.status().is_success() {
            return Err(BenchError::Unreachable(format!(
                "{} answered health check with HTTP {}",
                self.base_url,
                resp.status().as_u16()
            )));
        }
        resp.json()
            .await
            .map_err(|e| BenchError::Unreachable(format!("invalid health response: {}", e)))
    }

    /// `GET /gpu-simulation-status`
    pub async fn device_status(&self) -> Result<DeviceStatusResponse> {
        let resp = self
            .client
            .get(self.url("/gpu-simulation-status"))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .map_err(|e| BenchError::Network(e.to_string()))?;
        Self::control_body(resp).await
    }

    /// `POST /toggle-gpu-simulation`; returns the new mode
    pub async fn toggle_device(&self) -> Result<DeviceMode> {
        let resp = self
            .client
            .post(self.url("/toggle-gpu-simulation"))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .map_err(|e| BenchError::Network(e.to_string()))?;
        let body: ToggleResponse = Self::control_body(resp).await?;
        Ok(body.device)
    }

    /// One `/process` attempt. Errors are per-attempt failure kinds.
    pub async fn process(
        &self,
        workload: &WorkloadDescriptor,
    ) -> std::result::Result<ProcessResponse, FailureKind> {
        let resp = self
            .client
            .post(self.url("/process"))
            .query(&[
                ("pixels", workload.pixels()),
                ("iters", workload.iteration_count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| classify(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FailureKind::Status(status.as_u16()));
        }
        resp.json::<ProcessResponse>()
            .await
            .map_err(|e| match classify(&e) {
                FailureKind::Timeout => FailureKind::Timeout,
                _ => FailureKind::InvalidResponse,
            })
    }

    async fn control_body<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        Err(BenchError::ServerProcessing {
            status: status.as_u16(),
            message,
        })
    }
}
