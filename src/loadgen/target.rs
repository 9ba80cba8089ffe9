//! Request target
//!
//! What a load-test worker sends its requests to

use super::{Attempt, FailureKind};
use crate::client::TargetClient;
use crate::error::Result;
use crate::workload::WorkloadDescriptor;
use async_trait::async_trait;

/// Something a closed-loop worker can drive
///
/// `send` never fails: every transport or server problem comes back as a
/// failed [`Attempt`] so the worker can record it and keep going. Deadlines
/// are enforced by the caller.
#[async_trait]
pub trait RequestTarget: Send + Sync {
    /// Run-level reachability check performed before any worker starts
    async fn preflight(&self) -> Result<()>;

    /// Issue one processing request
    async fn send(&self, workload: &WorkloadDescriptor) -> Attempt;

    /// Human-readable name for logs
    fn describe(&self) -> String;
}

#[async_trait]
impl RequestTarget for TargetClient {
    async fn preflight(&self) -> Result<()> {
        let health = self.health().await?;
        tracing::info!(
            target_url = self.base_url(),
            device = %health.device,
            speedup_factor = health.speedup_factor,
            "Target health check passed"
        );
        Ok(())
    }

    async fn send(&self, workload: &WorkloadDescriptor) -> Attempt {
        match self.process(workload).await {
            Ok(resp) => Attempt::success(resp.device, resp.latency_ms),
            Err(kind) => Attempt::failure(kind),
        }
    }

    fn describe(&self) -> String {
        self.base_url().to_string()
    }
}

/// Map a reqwest error onto a per-attempt failure kind
pub(crate) fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::Connect
    } else if err.is_decode() {
        FailureKind::InvalidResponse
    } else if let Some(status) = err.status() {
        FailureKind::Status(status.as_u16())
    } else {
        FailureKind::Transport
    }
}
