//! Run reports and the CPU/GPU comparison reporter
//!
//! A comparison executes one load test per device profile, strictly one after
//! another, because every leg shares the same server-wide device state and
//! rolling gauge. The device is switched right before each leg and the mode
//! found at the start is put back afterwards, whether the comparison finished
//! or failed. A failed leg aborts the comparison and no speedup is reported.

use crate::client::TargetClient;
use crate::config::{LoadTestConfig, Termination};
use crate::device::DeviceMode;
use crate::error::{BenchError, Result};
use crate::loadgen::{LoadTestRun, RequestTarget, RunSpec, SealedRun};
use crate::stats::{summarize, summarize_by_device, LatencyStats, PercentileSummary};
use crate::workload::WorkloadDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// p95 latency a healthy run is expected to stay under, in milliseconds
pub const P95_TARGET_MS: f64 = 200.0;

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    /// Success rate of at least 99%
    Excellent,
    /// Success rate of at least 95%
    Acceptable,
    Poor,
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Acceptable => write!(f, "acceptable"),
            Self::Poor => write!(f, "poor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Server-reported p95 against [`P95_TARGET_MS`]; `None` without server latencies
    pub p95_within_target: Option<bool>,
    pub reliability: Reliability,
}

impl Assessment {
    pub fn of(summary: &PercentileSummary) -> Self {
        let reliability = if summary.success_rate >= 0.99 {
            Reliability::Excellent
        } else if summary.success_rate >= 0.95 {
            Reliability::Acceptable
        } else {
            Reliability::Poor
        };
        Self {
            p95_within_target: summary
                .server_latency
                .map(|server| server.p95 < P95_TARGET_MS),
            reliability,
        }
    }
}

// ---------------------------------------------------------------------------
// Single run
// ---------------------------------------------------------------------------

/// Everything printed after one load test
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub spec: RunSpec,
    pub summary: PercentileSummary,
    pub by_device: BTreeMap<DeviceMode, PercentileSummary>,
    pub assessment: Assessment,
}

impl RunReport {
    pub fn from_run(run: &SealedRun) -> Self {
        let summary = summarize(run);
        Self {
            run_id: run.id(),
            spec: run.spec().clone(),
            assessment: Assessment::of(&summary),
            by_device: summarize_by_device(run),
            summary,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn fmt_ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "no data".to_string())
}

fn write_latency(f: &mut fmt::Formatter<'_>, label: &str, stats: Option<&LatencyStats>) -> fmt::Result {
    writeln!(
        f,
        "  {:.<24} p50 {:>9}  p95 {:>9}  p99 {:>9}  mean {:>9}  min {:>9}  max {:>9}",
        label,
        fmt_ms(stats.map(|s| s.p50)),
        fmt_ms(stats.map(|s| s.p95)),
        fmt_ms(stats.map(|s| s.p99)),
        fmt_ms(stats.map(|s| s.mean)),
        fmt_ms(stats.map(|s| s.min)),
        fmt_ms(stats.map(|s| s.max)),
    )
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.summary;
        writeln!(f, "Load test {} against {}", self.run_id, self.spec.target)?;
        writeln!(
            f,
            "  workload {}  concurrency {}  stop after {}",
            self.spec.workload, self.spec.concurrency, self.spec.termination
        )?;
        writeln!(f, "  {}", "-".repeat(60))?;
        writeln!(
            f,
            "  {:.<24} {} ({} ok, {} failed)",
            "Requests", s.total, s.successes, s.failures
        )?;
        writeln!(f, "  {:.<24} {:.2}%", "Success rate", s.success_rate * 100.0)?;
        writeln!(f, "  {:.<24} {:.2}", "Requests/sec", s.requests_per_second)?;
        writeln!(f, "  {:.<24} {:.2}s", "Wall clock", s.wall_clock.as_secs_f64())?;
        write_latency(f, "Response time (ms)", s.latency.as_ref())?;
        write_latency(f, "Server latency (ms)", s.server_latency.as_ref())?;

        if !s.device_usage.is_empty() {
            writeln!(f, "  Device usage:")?;
            for (device, count) in &s.device_usage {
                let share = *count as f64 / s.successes.max(1) as f64 * 100.0;
                writeln!(f, "    {:<8} {:>8} ({:.1}%)", device.as_str(), count, share)?;
            }
        }
        if !s.failure_breakdown.is_empty() {
            writeln!(f, "  Failures:")?;
            for (kind, count) in &s.failure_breakdown {
                writeln!(f, "    {:<20} {:>8}", kind, count)?;
            }
        }

        let a = &self.assessment;
        let p95_verdict = match a.p95_within_target {
            Some(true) => format!("within {:.0} ms target", P95_TARGET_MS),
            Some(false) => format!("above {:.0} ms target", P95_TARGET_MS),
            None => "no data".to_string(),
        };
        writeln!(f, "  {:.<24} {}", "Server p95", p95_verdict)?;
        writeln!(f, "  {:.<24} {}", "Reliability", a.reliability)
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Read and flip the server-wide device mode
#[async_trait]
pub trait DeviceControl: Send + Sync {
    async fn current_mode(&self) -> Result<DeviceMode>;

    /// Flip the mode and return the new one
    async fn toggle(&self) -> Result<DeviceMode>;
}

#[async_trait]
impl DeviceControl for TargetClient {
    async fn current_mode(&self) -> Result<DeviceMode> {
        Ok(self.health().await?.device)
    }

    async fn toggle(&self) -> Result<DeviceMode> {
        self.toggle_device().await
    }
}

/// Results of one profile in a comparison
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonLeg {
    pub profile: DeviceMode,
    pub report: RunReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub legs: Vec<ComparisonLeg>,
    /// Client-observed `mean(cpu) / mean(gpu)`
    pub observed_speedup: Option<f64>,
    /// Same ratio over server-reported processing latency
    pub processing_speedup: Option<f64>,
}

impl ComparisonReport {
    fn new(legs: Vec<ComparisonLeg>) -> Self {
        let leg = |mode: DeviceMode| legs.iter().find(|l| l.profile == mode);
        let ratio = |pick: &dyn Fn(&PercentileSummary) -> Option<f64>| {
            let cpu = pick(&leg(DeviceMode::Cpu)?.report.summary)?;
            let gpu = pick(&leg(DeviceMode::Gpu)?.report.summary)?;
            (gpu > 0.0).then(|| cpu / gpu)
        };
        let observed_speedup = ratio(&|s: &PercentileSummary| s.mean());
        let processing_speedup = ratio(&|s: &PercentileSummary| s.server_latency.map(|l| l.mean));
        Self {
            legs,
            observed_speedup,
            processing_speedup,
        }
    }

    pub fn leg(&self, profile: DeviceMode) -> Option<&ComparisonLeg> {
        self.legs.iter().find(|l| l.profile == profile)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device comparison")?;
        writeln!(
            f,
            "  {:.<10} {:>10} {:>10} {:>10} {:>10} {:>9} {:>9}",
            "Profile", "p50 (ms)", "p95 (ms)", "p99 (ms)", "mean (ms)", "success", "req/s"
        )?;
        writeln!(f, "  {}", "-".repeat(74))?;
        for leg in &self.legs {
            let s = &leg.report.summary;
            writeln!(
                f,
                "  {:.<10} {:>10} {:>10} {:>10} {:>10} {:>8.1}% {:>9.1}",
                leg.profile.as_str(),
                fmt_ms(s.p50()),
                fmt_ms(s.p95()),
                fmt_ms(s.p99()),
                fmt_ms(s.mean()),
                s.success_rate * 100.0,
                s.requests_per_second
            )?;
        }
        let speedup = |v: Option<f64>| {
            v.map(|x| format!("{:.2}x", x))
                .unwrap_or_else(|| "no data".to_string())
        };
        writeln!(f, "  {:.<24} {}", "Observed speedup", speedup(self.observed_speedup))?;
        writeln!(f, "  {:.<24} {}", "Processing speedup", speedup(self.processing_speedup))
    }
}

/// Runs one load test per device profile and diffs the summaries
pub struct ComparisonReporter {
    config: LoadTestConfig,
    profiles: Vec<DeviceMode>,
}

impl ComparisonReporter {
    /// Baseline first, then the accelerated profile
    pub fn new(config: LoadTestConfig) -> Self {
        Self::with_profiles(config, vec![DeviceMode::Cpu, DeviceMode::Gpu])
    }

    pub fn with_profiles(config: LoadTestConfig, profiles: Vec<DeviceMode>) -> Self {
        Self { config, profiles }
    }

    pub fn profiles(&self) -> &[DeviceMode] {
        &self.profiles
    }

    pub async fn run(
        &self,
        target: Arc<dyn RequestTarget>,
        control: &dyn DeviceControl,
    ) -> Result<ComparisonReport> {
        if self.profiles.is_empty() {
            return Err(BenchError::Config("comparison needs at least one profile".into()));
        }
        self.config.validate()?;

        let initial = control.current_mode().await?;
        tracing::info!(initial = %initial, profiles = self.profiles.len(), "Starting device comparison");

        let result = self.run_legs(target, control).await;

        if let Err(e) = restore(control, initial).await {
            tracing::error!(mode = %initial, error = %e, "Failed to restore device mode");
            if result.is_ok() {
                return Err(e);
            }
        }

        let legs = result?;
        Ok(ComparisonReport::new(legs))
    }

    async fn run_legs(
        &self,
        target: Arc<dyn RequestTarget>,
        control: &dyn DeviceControl,
    ) -> Result<Vec<ComparisonLeg>> {
        let mut legs = Vec::with_capacity(self.profiles.len());

        for &profile in &self.profiles {
            let leg = async {
                switch_to(control, profile).await?;
                tracing::info!(profile = %profile, "Running comparison leg");
                let run = LoadTestRun::new(self.config.clone())
                    .execute(target.clone())
                    .await?;
                Ok::<_, BenchError>(RunReport::from_run(&run))
            };

            match leg.await {
                Ok(report) => legs.push(ComparisonLeg { profile, report }),
                Err(e) => {
                    tracing::error!(profile = %profile, error = %e, "Comparison leg failed");
                    return Err(BenchError::ComparisonAborted {
                        profile,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(legs)
    }
}

/// Put the device into `target` mode, toggling only if needed
async fn switch_to(control: &dyn DeviceControl, target: DeviceMode) -> Result<()> {
    let current = control.current_mode().await?;
    if current == target {
        return Ok(());
    }
    let now = control.toggle().await?;
    if now != target {
        return Err(BenchError::State(format!(
            "expected device {} after toggle, server reports {}",
            target, now
        )));
    }
    Ok(())
}

async fn restore(control: &dyn DeviceControl, initial: DeviceMode) -> Result<()> {
    switch_to(control, initial).await?;
    tracing::info!(mode = %initial, "Device mode restored");
    Ok(())
}

// ---------------------------------------------------------------------------
// Workload sweep
// ---------------------------------------------------------------------------

/// One frame size in a workload sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepCase {
    pub name: String,
    pub workload: WorkloadDescriptor,
    pub concurrency: usize,
    pub requests: u64,
}

impl SweepCase {
    pub fn new(name: &str, workload: WorkloadDescriptor, concurrency: usize, requests: u64) -> Self {
        Self {
            name: name.to_string(),
            workload,
            concurrency,
            requests,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub case: SweepCase,
    pub report: RunReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub results: Vec<SweepResult>,
}

impl SweepReport {
    pub fn result(&self, name: &str) -> Option<&SweepResult> {
        self.results.iter().find(|r| r.case.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workload sweep")?;
        writeln!(
            f,
            "  {:.<10} {:>10} {:>6} {:>16} {:>15} {:>9}  {}",
            "Case", "pixels", "iters", "mean server (ms)", "p95 server (ms)", "success", "device mix"
        )?;
        writeln!(f, "  {}", "-".repeat(84))?;
        for result in &self.results {
            let s = &result.report.summary;
            let mix = s
                .device_usage
                .iter()
                .map(|(device, count)| format!("{} {}", device.as_str(), count))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                f,
                "  {:.<10} {:>10} {:>6} {:>16} {:>15} {:>8.1}%  {}",
                result.case.name,
                result.case.workload.pixels(),
                result.case.workload.iteration_count,
                fmt_ms(s.server_latency.map(|l| l.mean)),
                fmt_ms(s.server_latency.map(|l| l.p95)),
                s.success_rate * 100.0,
                if mix.is_empty() { "-" } else { mix.as_str() }
            )?;
        }
        Ok(())
    }
}

/// Runs one load test per frame size, in order, under whatever device mode is active
pub struct WorkloadSweep {
    base: LoadTestConfig,
    cases: Vec<SweepCase>,
}

impl WorkloadSweep {
    /// Small, medium and large frames
    pub fn standard(base: LoadTestConfig) -> Self {
        Self::with_cases(
            base,
            vec![
                SweepCase::new("small", WorkloadDescriptor::new(640, 480, 3), 5, 10),
                SweepCase::new("medium", WorkloadDescriptor::new(1280, 720, 5), 5, 10),
                SweepCase::new("large", WorkloadDescriptor::new(1920, 1080, 8), 3, 10),
            ],
        )
    }

    pub fn with_cases(base: LoadTestConfig, cases: Vec<SweepCase>) -> Self {
        Self { base, cases }
    }

    pub fn cases(&self) -> &[SweepCase] {
        &self.cases
    }

    fn case_config(&self, case: &SweepCase) -> LoadTestConfig {
        LoadTestConfig {
            concurrency: case.concurrency,
            termination: Termination::Requests(case.requests),
            workload: case.workload,
            ..self.base.clone()
        }
    }

    pub async fn run(&self, target: Arc<dyn RequestTarget>) -> Result<SweepReport> {
        if self.cases.is_empty() {
            return Err(BenchError::Config("sweep needs at least one case".into()));
        }
        for case in &self.cases {
            self.case_config(case).validate()?;
        }

        let mut results = Vec::with_capacity(self.cases.len());
        for case in &self.cases {
            tracing::info!(case = %case.name, workload = %case.workload, "Running sweep case");
            let run = LoadTestRun::new(self.case_config(case))
                .execute(target.clone())
                .await
                .map_err(|e| {
                    tracing::error!(case = %case.name, error = %e, "Sweep case failed");
                    BenchError::SweepAborted {
                        case: case.name.clone(),
                        source: Box::new(e),
                    }
                })?;
            results.push(SweepResult {
                case: case.clone(),
                report: RunReport::from_run(&run),
            });
        }

        Ok(SweepReport { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Termination;
    use crate::loadgen::{Attempt, Outcome, RequestSample};
    use crate::workload::WorkloadDescriptor;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fake service: latency depends on the current mode
    struct FakeService {
        mode: Mutex<DeviceMode>,
        toggles: AtomicU64,
        fail_on_cpu: AtomicBool,
        broken_toggle: bool,
    }

    impl FakeService {
        fn new(mode: DeviceMode) -> Self {
            Self {
                mode: Mutex::new(mode),
                toggles: AtomicU64::new(0),
                fail_on_cpu: AtomicBool::new(false),
                broken_toggle: false,
            }
        }

        fn mode(&self) -> DeviceMode {
            *self.mode.lock().unwrap()
        }
    }

    #[async_trait]
    impl RequestTarget for FakeService {
        async fn preflight(&self) -> Result<()> {
            if self.mode() == DeviceMode::Cpu && self.fail_on_cpu.load(Ordering::SeqCst) {
                return Err(BenchError::Unreachable("refused".into()));
            }
            Ok(())
        }

        async fn send(&self, _workload: &WorkloadDescriptor) -> Attempt {
            let mode = self.mode();
            let ms = match mode {
                DeviceMode::Cpu => 16,
                DeviceMode::Gpu => 4,
            };
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Attempt::success(mode, ms as f64)
        }

        fn describe(&self) -> String {
            "fake".into()
        }
    }

    #[async_trait]
    impl DeviceControl for FakeService {
        async fn current_mode(&self) -> Result<DeviceMode> {
            Ok(self.mode())
        }

        async fn toggle(&self) -> Result<DeviceMode> {
            self.toggles.fetch_add(1, Ordering::SeqCst);
            if self.broken_toggle {
                return Ok(self.mode());
            }
            let mut mode = self.mode.lock().unwrap();
            *mode = mode.toggled();
            Ok(*mode)
        }
    }

    fn config() -> LoadTestConfig {
        LoadTestConfig {
            target: "http://127.0.0.1:8080".into(),
            concurrency: 2,
            termination: Termination::Requests(10),
            workload: WorkloadDescriptor::new(64, 64, 1),
            timeout: Duration::from_secs(2),
            progress_every: 0,
        }
    }

    fn stats_with_p95(p: f64) -> LatencyStats {
        LatencyStats {
            p50: p / 2.0,
            p95: p,
            p99: p,
            mean: p / 2.0,
            min: 1.0,
            max: p,
        }
    }

    fn summary_with(success_rate: f64, p95: Option<f64>) -> PercentileSummary {
        PercentileSummary {
            total: 100,
            successes: (success_rate * 100.0) as u64,
            failures: 100 - (success_rate * 100.0) as u64,
            success_rate,
            requests_per_second: 10.0,
            wall_clock: Duration::from_secs(10),
            latency: p95.map(|p| stats_with_p95(p + 20.0)),
            server_latency: p95.map(stats_with_p95),
            device_usage: BTreeMap::new(),
            failure_breakdown: BTreeMap::new(),
        }
    }

    #[test]
    fn test_assessment_thresholds() {
        let a = Assessment::of(&summary_with(1.0, Some(50.0)));
        assert_eq!(a.reliability, Reliability::Excellent);
        assert_eq!(a.p95_within_target, Some(true));

        let a = Assessment::of(&summary_with(0.96, Some(250.0)));
        assert_eq!(a.reliability, Reliability::Acceptable);
        assert_eq!(a.p95_within_target, Some(false));

        let a = Assessment::of(&summary_with(0.0, None));
        assert_eq!(a.reliability, Reliability::Poor);
        assert_eq!(a.p95_within_target, None);
    }

    #[test]
    fn test_assessment_judges_server_latency() {
        // client p95 is 210ms, server p95 is 190ms
        let a = Assessment::of(&summary_with(1.0, Some(190.0)));
        assert_eq!(a.p95_within_target, Some(true));

        let mut summary = summary_with(1.0, Some(190.0));
        summary.server_latency = None;
        assert_eq!(Assessment::of(&summary).p95_within_target, None);
    }

    #[test]
    fn test_run_report_renders_no_data() {
        let spec = RunSpec::from(&config());
        let failed = RequestSample {
            issued_at: Duration::ZERO,
            latency: Duration::from_millis(5),
            outcome: Outcome::Failure(crate::loadgen::FailureKind::Status(503)),
            device_used: None,
            server_latency_ms: None,
            workload: WorkloadDescriptor::new(64, 64, 1),
        };
        let run = SealedRun::from_samples(spec, vec![failed]);
        let report = RunReport::from_run(&run);
        let text = report.to_string();
        assert!(text.contains("no data"));
        assert!(text.contains("HTTP 503"));
        assert!(text.contains("0.00%"));
        assert!(report.to_json().unwrap().contains("\"success_rate\": 0.0"));
    }

    #[tokio::test]
    async fn test_comparison_restores_initial_mode() {
        let service = Arc::new(FakeService::new(DeviceMode::Gpu));
        let reporter = ComparisonReporter::new(config());
        let report = reporter
            .run(service.clone(), service.as_ref())
            .await
            .unwrap();

        assert_eq!(report.legs.len(), 2);
        assert_eq!(report.legs[0].profile, DeviceMode::Cpu);
        assert_eq!(report.legs[1].profile, DeviceMode::Gpu);
        assert_eq!(
            report.leg(DeviceMode::Cpu).unwrap().report.summary.device_usage[&DeviceMode::Cpu],
            10
        );
        assert_eq!(service.mode(), DeviceMode::Gpu);
        // gpu -> cpu, cpu -> gpu; restore is a no-op
        assert_eq!(service.toggles.load(Ordering::SeqCst), 2);

        let speedup = report.observed_speedup.unwrap();
        assert!(speedup > 2.0, "speedup {}", speedup);
        assert!((report.processing_speedup.unwrap() - 4.0).abs() < 1e-9);
        assert!(report.to_string().contains("Observed speedup"));
    }

    #[tokio::test]
    async fn test_failed_leg_aborts_and_restores() {
        let service = Arc::new(FakeService::new(DeviceMode::Gpu));
        service.fail_on_cpu.store(true, Ordering::SeqCst);
        let err = ComparisonReporter::new(config())
            .run(service.clone(), service.as_ref())
            .await
            .unwrap_err();

        match err {
            BenchError::ComparisonAborted { profile, source } => {
                assert_eq!(profile, DeviceMode::Cpu);
                assert!(matches!(*source, BenchError::Unreachable(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(service.mode(), DeviceMode::Gpu);
    }

    #[tokio::test]
    async fn test_toggle_that_does_not_take_is_state_error() {
        let service = Arc::new(FakeService {
            broken_toggle: true,
            ..FakeService::new(DeviceMode::Gpu)
        });
        let err = ComparisonReporter::new(config())
            .run(service.clone(), service.as_ref())
            .await
            .unwrap_err();
        match err {
            BenchError::ComparisonAborted { profile, source } => {
                assert_eq!(profile, DeviceMode::Cpu);
                assert!(matches!(*source, BenchError::State(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_no_speedup_without_both_profiles() {
        let service = Arc::new(FakeService::new(DeviceMode::Cpu));
        let report = ComparisonReporter::with_profiles(config(), vec![DeviceMode::Gpu])
            .run(service.clone(), service.as_ref())
            .await
            .unwrap();
        assert_eq!(report.legs.len(), 1);
        assert!(report.observed_speedup.is_none());
        assert_eq!(service.mode(), DeviceMode::Cpu);
    }

    #[tokio::test]
    async fn test_standard_sweep_runs_each_case() {
        let service = Arc::new(FakeService::new(DeviceMode::Gpu));
        let sweep = WorkloadSweep::standard(config());
        let names: Vec<_> = sweep.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["small", "medium", "large"]);

        let report = sweep.run(service.clone()).await.unwrap();
        assert_eq!(report.results.len(), 3);
        for result in &report.results {
            let summary = &result.report.summary;
            assert_eq!(summary.total, 10);
            assert_eq!(summary.device_usage[&DeviceMode::Gpu], 10);
            assert!(summary.server_latency.is_some());
            assert_eq!(result.report.spec.workload, result.case.workload);
        }
        let large = report.result("large").unwrap();
        assert_eq!(large.case.workload, WorkloadDescriptor::new(1920, 1080, 8));
        assert_eq!(large.report.spec.concurrency, 3);

        let text = report.to_string();
        assert!(text.contains("medium"));
        assert!(text.contains("1920x1080"));
        assert!(text.contains("gpu 10"));
        // the sweep never touches the device
        assert_eq!(service.toggles.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sweep_failure_names_case() {
        let service = Arc::new(FakeService::new(DeviceMode::Cpu));
        service.fail_on_cpu.store(true, Ordering::SeqCst);
        let err = WorkloadSweep::standard(config())
            .run(service)
            .await
            .unwrap_err();
        match err {
            BenchError::SweepAborted { case, source } => {
                assert_eq!(case, "small");
                assert!(matches!(*source, BenchError::Unreachable(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_rejects_invalid_case_up_front() {
        let service = Arc::new(FakeService::new(DeviceMode::Gpu));
        let sweep = WorkloadSweep::with_cases(
            config(),
            vec![
                SweepCase::new("ok", WorkloadDescriptor::new(64, 64, 1), 2, 4),
                SweepCase::new("bad", WorkloadDescriptor::new(64, 64, 1), 0, 4),
            ],
        );
        let err = sweep.run(service).await.unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));
    }
}
