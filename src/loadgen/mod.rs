//! Closed-loop load generator
//!
//! Exactly `concurrency` workers run at once. Each issues one request, waits
//! for the response or its deadline, records a [`RequestSample`], and only
//! then issues the next. This measures sustained capacity at a fixed number
//! of outstanding requests, not tolerance to an offered arrival rate: a slow
//! target slows the generator down instead of building a queue.
//!
//! Failed attempts (timeouts, refused connections, 5xx) are recorded and the
//! run keeps going. Only a failed preflight or a crashed worker aborts a run.

pub mod target;

pub use crate::config::{LoadTestConfig, Termination};
pub use target::RequestTarget;

use crate::device::DeviceMode;
use crate::error::{BenchError, Result};
use crate::workload::WorkloadDescriptor;
use crate::RunState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Deadline exceeded; the sample's latency is the deadline itself
    Timeout,
    /// Connection refused, DNS failure, reset before a response
    Connect,
    /// Non-success HTTP status
    Status(u16),
    /// Any other transport error
    Transport,
    /// Success status with a body that could not be decoded
    InvalidResponse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect => write!(f, "connect"),
            Self::Status(code) => write!(f, "status {}", code),
            Self::Transport => write!(f, "transport"),
            Self::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure(FailureKind),
}

/// What a target returned for one attempt, before timing is attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attempt {
    pub outcome: Outcome,
    pub device_used: Option<DeviceMode>,
    pub server_latency_ms: Option<f64>,
}

impl Attempt {
    pub fn success(device: DeviceMode, server_latency_ms: f64) -> Self {
        Self {
            outcome: Outcome::Success,
            device_used: Some(device),
            server_latency_ms: Some(server_latency_ms),
        }
    }

    pub fn failure(kind: FailureKind) -> Self {
        Self {
            outcome: Outcome::Failure(kind),
            device_used: None,
            server_latency_ms: None,
        }
    }
}

/// One recorded attempt. Created once by the worker that made it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    /// Dispatch time as an offset from the start of the run
    pub issued_at: Duration,
    /// Client-observed latency, or the deadline for a timeout
    pub latency: Duration,
    pub outcome: Outcome,
    /// Device label reported by the server; `None` when no valid response arrived
    pub device_used: Option<DeviceMode>,
    pub server_latency_ms: Option<f64>,
    pub workload: WorkloadDescriptor,
}

impl RequestSample {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn failure(&self) -> Option<&FailureKind> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure(kind) => Some(kind),
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    /// Offset at which the response arrived or the attempt was declared failed
    pub fn completed_at(&self) -> Duration {
        self.issued_at + self.latency
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Parameters a run was executed with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    pub target: String,
    pub concurrency: usize,
    pub termination: Termination,
    pub workload: WorkloadDescriptor,
}

impl From<&LoadTestConfig> for RunSpec {
    fn from(config: &LoadTestConfig) -> Self {
        Self {
            target: config.target.clone(),
            concurrency: config.concurrency,
            termination: config.termination,
            workload: config.workload,
        }
    }
}

/// A completed run: read-only from here on
#[derive(Debug, Clone, Serialize)]
pub struct SealedRun {
    id: Uuid,
    spec: RunSpec,
    started_at: DateTime<Utc>,
    samples: Vec<RequestSample>,
    max_in_flight: usize,
}

impl SealedRun {
    /// Seal a set of samples collected outside a live run
    pub fn from_samples(spec: RunSpec, samples: Vec<RequestSample>) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            started_at: Utc::now(),
            samples,
            max_in_flight: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn spec(&self) -> &RunSpec {
        &self.spec
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn samples(&self) -> &[RequestSample] {
        &self.samples
    }

    /// Highest number of simultaneously outstanding requests observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// First dispatch to last completion
    pub fn wall_clock(&self) -> Duration {
        let first = self.samples.iter().map(|s| s.issued_at).min();
        let last = self.samples.iter().map(|s| s.completed_at()).max();
        match (first, last) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Duration::ZERO,
        }
    }
}

/// Counters shared by the workers of one run
struct RunShared {
    workload: WorkloadDescriptor,
    termination: Termination,
    timeout: Duration,
    started: Instant,
    dispatched: AtomicU64,
    completed: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    progress_every: u64,
    stop: watch::Sender<bool>,
}

impl RunShared {
    /// Reserve the right to dispatch one more request
    fn claim(&self) -> bool {
        if *self.stop.borrow() {
            return false;
        }
        match self.termination {
            Termination::Requests(total) => {
                let ticket = self.dispatched.fetch_add(1, Ordering::SeqCst);
                if ticket >= total {
                    self.stop.send_replace(true);
                    return false;
                }
                if ticket + 1 == total {
                    self.stop.send_replace(true);
                }
                true
            }
            Termination::Duration(_) => {
                self.dispatched.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let finished = matches!(self.termination, Termination::Requests(total) if done == total);
        if self.progress_every > 0 && (done % self.progress_every == 0 || finished) {
            let elapsed = self.started.elapsed().as_secs_f64();
            let rps = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
            match self.termination {
                Termination::Requests(total) => tracing::info!(
                    completed = done,
                    total,
                    percent = %format_args!("{:.1}", done as f64 / total as f64 * 100.0),
                    rps = %format_args!("{:.1}", rps),
                    "Progress"
                ),
                Termination::Duration(_) => tracing::info!(
                    completed = done,
                    elapsed_secs = %format_args!("{:.1}", elapsed),
                    rps = %format_args!("{:.1}", rps),
                    "Progress"
                ),
            }
        }
    }
}

/// One load test. Moves `Idle → Running → Completed | Aborted` exactly once.
pub struct LoadTestRun {
    config: LoadTestConfig,
    state: RunState,
}

impl LoadTestRun {
    pub fn new(config: LoadTestConfig) -> Self {
        Self {
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Execute the run against `target` and seal it.
    ///
    /// Returns only after every worker has exited. A precondition failure
    /// aborts with zero samples and no summary.
    pub async fn execute(&mut self, target: Arc<dyn RequestTarget>) -> Result<SealedRun> {
        if self.state != RunState::Idle {
            return Err(BenchError::State(format!(
                "load test run is {} and cannot be started again",
                self.state
            )));
        }

        if let Err(e) = self.config.validate() {
            self.transition(RunState::Aborted);
            return Err(e);
        }

        self.transition(RunState::Running);

        if let Err(e) = target.preflight().await {
            self.transition(RunState::Aborted);
            tracing::error!(target_url = %target.describe(), error = %e, "Preflight failed, aborting run");
            return Err(match e {
                BenchError::Unreachable(_) => e,
                other => BenchError::Unreachable(other.to_string()),
            });
        }

        match self.drive(target).await {
            Ok(run) => {
                self.transition(RunState::Completed);
                Ok(run)
            }
            Err(e) => {
                self.transition(RunState::Aborted);
                Err(e)
            }
        }
    }

    async fn drive(&self, target: Arc<dyn RequestTarget>) -> Result<SealedRun> {
        let config = &self.config;
        let (stop, _) = watch::channel(false);
        let started_at = Utc::now();
        let shared = Arc::new(RunShared {
            workload: config.workload,
            termination: config.termination,
            timeout: config.timeout,
            started: Instant::now(),
            dispatched: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            progress_every: config.progress_every,
            stop,
        });

        tracing::info!(
            target_url = %target.describe(),
            concurrency = config.concurrency,
            termination = %config.termination,
            workload = %config.workload,
            "Starting closed-loop load test"
        );

        let timer = match config.termination {
            Termination::Duration(d) => {
                let shared = shared.clone();
                Some(tokio::spawn(async move {
                    tokio::time::sleep(d).await;
                    shared.stop.send_replace(true);
                }))
            }
            Termination::Requests(_) => None,
        };

        let handles: Vec<_> = (0..config.concurrency)
            .map(|id| tokio::spawn(worker(id, target.clone(), shared.clone())))
            .collect();

        // Join every worker before looking at any result
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await);
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let mut samples = Vec::new();
        for (id, result) in results.into_iter().enumerate() {
            match result {
                Ok(worker_samples) => samples.extend(worker_samples),
                Err(e) => {
                    return Err(BenchError::RunAborted(format!("worker {} failed: {}", id, e)));
                }
            }
        }
        samples.sort_by_key(|s| s.issued_at);

        Ok(SealedRun {
            id: Uuid::new_v4(),
            spec: RunSpec::from(config),
            started_at,
            samples,
            max_in_flight: shared.max_in_flight.load(Ordering::SeqCst),
        })
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "Run state transition");
        self.state = next;
    }
}

async fn worker(id: usize, target: Arc<dyn RequestTarget>, shared: Arc<RunShared>) -> Vec<RequestSample> {
    let mut samples = Vec::new();

    while shared.claim() {
        let issued_at = shared.started.elapsed();
        shared.enter();
        let start = Instant::now();
        let (attempt, latency) =
            match tokio::time::timeout(shared.timeout, target.send(&shared.workload)).await {
                Ok(attempt) => (attempt, start.elapsed()),
                Err(_) => (Attempt::failure(FailureKind::Timeout), shared.timeout),
            };
        shared.exit();

        if let Outcome::Failure(kind) = attempt.outcome {
            tracing::debug!(worker = id, failure = %kind, latency_ms = latency.as_secs_f64() * 1000.0, "Request failed");
        }

        samples.push(RequestSample {
            issued_at,
            latency,
            outcome: attempt.outcome,
            device_used: attempt.device_used,
            server_latency_ms: attempt.server_latency_ms,
            workload: shared.workload,
        });
    }

    samples
}

/// Validate `config`, then run a single load test against `target`
pub async fn run_load_test(config: LoadTestConfig, target: Arc<dyn RequestTarget>) -> Result<SealedRun> {
    LoadTestRun::new(config).execute(target).await
}
