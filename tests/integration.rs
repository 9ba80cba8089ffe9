//! Integration tests for rtc-gpu-media
//!
//! These tests bind the real server on a local port and drive it with the
//! real HTTP client and load generator.

use rtc_gpu_media::config::{
    DeviceConfig, GaugeConfig, LoadTestConfig, ServerConfig, SimulatorConfig, Termination,
};
use rtc_gpu_media::loadgen::FailureKind;
use rtc_gpu_media::report::ComparisonReporter;
use rtc_gpu_media::stats::{percentile, sort_latencies, summarize, summarize_by_device};
use rtc_gpu_media::{
    BenchError, DeviceMode, LoadTestRun, RunState, Server, TargetClient, WorkloadDescriptor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Find a free port on localhost
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn server_config(mode: DeviceMode, simulator: SimulatorConfig) -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".into(),
        device: DeviceConfig {
            mode,
            speedup_factor: 4.0,
        },
        simulator,
        gauge: GaugeConfig { capacity: 512 },
        shutdown_timeout_secs: 2,
    }
}

/// Fast, jitter-free latency model
fn quick_simulator() -> SimulatorConfig {
    SimulatorConfig {
        base_latency_ms: 2.0,
        ms_per_megapixel_iteration: 1.0,
        jitter_ratio: 0.0,
        ..Default::default()
    }
}

async fn spawn_server(config: ServerConfig) -> (Server, SocketAddr) {
    let server = Server::new(config).unwrap();
    let addr = server.start().await.unwrap();
    (server, addr)
}

fn load_config(addr: SocketAddr, requests: u64, concurrency: usize) -> LoadTestConfig {
    LoadTestConfig {
        target: format!("http://{}", addr),
        concurrency,
        termination: Termination::Requests(requests),
        workload: WorkloadDescriptor::new(640, 480, 2),
        timeout: Duration::from_secs(5),
        progress_every: 10,
    }
}

fn client(addr: SocketAddr) -> TargetClient {
    TargetClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap()
}

/// Value of an unlabelled Prometheus sample line
fn metric_value(text: &str, name: &str) -> Option<f64> {
    text.lines()
        .find_map(|line| line.strip_prefix(&format!("{} ", name)))
        .and_then(|v| v.trim().parse().ok())
}

// ---------------------------------------------------------------------------
// Load test scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_healthy_target_full_success() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;

    let mut run = LoadTestRun::new(load_config(addr, 25, 5));
    let sealed = run.execute(Arc::new(client(addr))).await.unwrap();
    assert_eq!(run.state(), RunState::Completed);
    assert_eq!(sealed.samples().len(), 25);
    assert!(sealed.max_in_flight() <= 5);

    let summary = summarize(&sealed);
    assert_eq!(summary.total, 25);
    assert_eq!(summary.success_rate, 1.0);
    let (p50, p95, p99) = (
        summary.p50().unwrap(),
        summary.p95().unwrap(),
        summary.p99().unwrap(),
    );
    assert!(p50 <= p95 && p95 <= p99);
    assert!(p99 <= summary.latency.unwrap().max);
    assert_eq!(summary.device_usage[&DeviceMode::Gpu], 25);
    assert!(summary.server_latency.is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_target_aborts() {
    let port = free_port().await;
    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();

    let mut run = LoadTestRun::new(load_config(addr, 10, 2));
    let err = run.execute(Arc::new(client(addr))).await.unwrap_err();
    assert!(matches!(err, BenchError::Unreachable(_)));
    assert_eq!(run.state(), RunState::Aborted);
}

#[tokio::test]
async fn test_unreachable_target_exit_code() {
    let port = free_port().await;
    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_rtc-gpu-media"))
        .args([
            "load",
            "--url",
            &format!("http://127.0.0.1:{}", port),
            "--requests",
            "5",
            "--log-level",
            "error",
        ])
        .output()
        .await
        .unwrap();
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Success rate"));
}

#[tokio::test]
async fn test_invalid_flags_exit_code() {
    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_rtc-gpu-media"))
        .args(["load", "--concurrency", "0", "--log-level", "error"])
        .output()
        .await
        .unwrap();
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_load_command_success_exit_code() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_rtc-gpu-media"))
        .args([
            "load",
            "--url",
            &format!("http://{}", addr),
            "--requests",
            "25",
            "--concurrency",
            "5",
            "--pixels",
            "640x480",
            "--iterations",
            "2",
            "--log-level",
            "error",
        ])
        .env_remove("RUST_LOG")
        .output()
        .await
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Success rate"));
    assert!(stdout.contains("100.00%"));
    assert!(stdout.contains("25 (25 ok, 0 failed)"));
    assert_eq!(server.gauge().len(), 25);

    server.shutdown().await;
}

#[tokio::test]
async fn test_load_command_json_sweep() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_rtc-gpu-media"))
        .args([
            "load",
            "--url",
            &format!("http://{}", addr),
            "--sweep",
            "--json",
            "--log-level",
            "error",
        ])
        .env_remove("RUST_LOG")
        .output()
        .await
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = report["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[2]["case"]["name"], "large");
    assert_eq!(results[2]["report"]["summary"]["total"], 10);

    server.shutdown().await;
}

#[tokio::test]
async fn test_injected_failures_counted() {
    let sim = SimulatorConfig {
        failure_rate: 0.1,
        ..quick_simulator()
    };
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, sim)).await;

    let sealed = LoadTestRun::new(load_config(addr, 100, 20))
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();
    let summary = summarize(&sealed);
    assert_eq!(summary.total, 100);
    assert_eq!(summary.failures, 10);
    assert!((summary.success_rate - 0.9).abs() < 1e-9);
    assert_eq!(summary.failure_breakdown["HTTP 503"], 10);

    // throughput counts failed attempts too
    let expected_rps = 100.0 / sealed.wall_clock().as_secs_f64();
    assert!((summary.requests_per_second - expected_rps).abs() < 1e-6);

    // only successful requests reach the gauge
    assert_eq!(server.gauge().len(), 90);

    server.shutdown().await;
}

#[tokio::test]
async fn test_timeouts_recorded_with_deadline() {
    let sim = SimulatorConfig {
        base_latency_ms: 300.0,
        ..quick_simulator()
    };
    let (server, addr) = spawn_server(server_config(DeviceMode::Cpu, sim)).await;

    let mut config = load_config(addr, 4, 2);
    config.timeout = Duration::from_millis(50);
    let sealed = LoadTestRun::new(config)
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();
    assert_eq!(sealed.samples().len(), 4);
    for sample in sealed.samples() {
        assert_eq!(sample.failure(), Some(&FailureKind::Timeout));
        assert!(sample.device_used.is_none());
    }
    let summary = summarize(&sealed);
    assert!(summary.latency.is_none());
    assert_eq!(summary.success_rate, 0.0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_server_limits_decide_workload_bounds() {
    let sim = SimulatorConfig {
        max_iterations: 200,
        ..quick_simulator()
    };
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, sim)).await;
    let mut config = load_config(addr, 6, 2);
    config.workload = WorkloadDescriptor::new(64, 64, 150);
    let sealed = LoadTestRun::new(config.clone())
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();
    assert!(sealed.samples().iter().all(|s| s.is_success()));
    server.shutdown().await;

    // the same workload against default limits comes back as 400 samples
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;
    config.target = format!("http://{}", addr);
    let sealed = LoadTestRun::new(config)
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();
    assert_eq!(sealed.samples().len(), 6);
    for sample in sealed.samples() {
        assert_eq!(sample.failure(), Some(&FailureKind::Status(400)));
    }
    assert!(server.gauge().is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn test_toggle_mid_run_labels_match_dispatch_mode() {
    let sim = SimulatorConfig {
        base_latency_ms: 20.0,
        ms_per_megapixel_iteration: 0.001,
        jitter_ratio: 0.0,
        ..Default::default()
    };
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, sim)).await;

    let toggler = {
        let control = client(addr);
        tokio::spawn(async move {
            for _ in 0..6 {
                tokio::time::sleep(Duration::from_millis(40)).await;
                control.toggle_device().await.unwrap();
            }
        })
    };

    let sealed = LoadTestRun::new(load_config(addr, 120, 6))
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();
    toggler.await.unwrap();

    assert!(sealed.samples().iter().all(|s| s.is_success()));
    let by_device = summarize_by_device(&sealed);
    assert_eq!(by_device.len(), 2, "both modes should have served requests");

    // cpu requests sleep ~20ms, gpu ~5ms: the label must agree with the delay
    let gpu_max = by_device[&DeviceMode::Gpu].server_latency.unwrap().max;
    let cpu_min = by_device[&DeviceMode::Cpu].server_latency.unwrap().min;
    assert!(cpu_min > gpu_max, "cpu min {} <= gpu max {}", cpu_min, gpu_max);

    server.shutdown().await;
}

#[tokio::test]
async fn test_duration_terminated_run() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;

    let mut config = load_config(addr, 1, 4);
    config.termination = Termination::Duration(Duration::from_millis(200));
    let sealed = LoadTestRun::new(config)
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();
    assert!(sealed.samples().len() > 4);
    assert!(sealed.wall_clock() >= Duration::from_millis(150));

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_comparison_speedup_matches_factor() {
    let sim = SimulatorConfig {
        base_latency_ms: 80.0,
        ms_per_megapixel_iteration: 4.0,
        jitter_ratio: 0.05,
        ..Default::default()
    };
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, sim)).await;
    let control = client(addr);

    let reporter = ComparisonReporter::new(load_config(addr, 40, 8));
    let report = reporter
        .run(Arc::new(control.clone()), &control)
        .await
        .unwrap();

    let observed = report.observed_speedup.unwrap();
    assert!(
        (observed - 4.0).abs() <= 4.0 * 0.15,
        "observed speedup {} outside tolerance",
        observed
    );
    let processing = report.processing_speedup.unwrap();
    assert!((processing - 4.0).abs() <= 4.0 * 0.15);

    let cpu = &report.leg(DeviceMode::Cpu).unwrap().report.summary;
    assert_eq!(cpu.device_usage.get(&DeviceMode::Cpu), Some(&40));
    assert_eq!(cpu.device_usage.get(&DeviceMode::Gpu), None);

    // started in gpu mode, so gpu mode is restored
    assert_eq!(server.device().mode(), DeviceMode::Gpu);
    assert_eq!(server.device().toggle_count(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_comparison_restores_cpu_start() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Cpu, quick_simulator())).await;
    let control = client(addr);

    ComparisonReporter::new(load_config(addr, 10, 2))
        .run(Arc::new(control.clone()), &control)
        .await
        .unwrap();
    assert_eq!(server.device().mode(), DeviceMode::Cpu);

    server.shutdown().await;
}

#[tokio::test]
async fn test_comparison_speedup_with_default_settings() {
    let (server, addr) = spawn_server(ServerConfig {
        listen: "127.0.0.1:0".into(),
        ..Default::default()
    })
    .await;
    let factor = server.device().snapshot().speedup_factor;
    let control = client(addr);

    let report = ComparisonReporter::new(LoadTestConfig {
        target: format!("http://{}", addr),
        ..Default::default()
    })
    .run(Arc::new(control.clone()), &control)
    .await
    .unwrap();

    let observed = report.observed_speedup.unwrap();
    assert!(
        (observed - factor).abs() <= factor * 0.15,
        "observed speedup {} vs factor {}",
        observed,
        factor
    );
    let processing = report.processing_speedup.unwrap();
    assert!(
        (processing - factor).abs() <= factor * 0.15,
        "processing speedup {} vs factor {}",
        processing,
        factor
    );
    assert_eq!(server.device().mode(), DeviceMode::Gpu);

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_metrics_p95_matches_served_latencies() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;

    let sealed = LoadTestRun::new(load_config(addr, 40, 4))
        .execute(Arc::new(client(addr)))
        .await
        .unwrap();

    let body = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("# TYPE app_request_latency_p95_seconds gauge"));
    assert!(body.contains("app_requests_total{endpoint=\"/process\"} 40"));
    assert!(body.contains("app_request_latency_seconds_count 40"));
    assert!(body.contains("app_device_mode{device=\"gpu\"} 1"));

    let exported = metric_value(&body, "app_request_latency_p95_seconds").unwrap();
    let mut served: Vec<f64> = sealed
        .samples()
        .iter()
        .filter_map(|s| s.server_latency_ms)
        .map(|ms| ms / 1000.0)
        .collect();
    sort_latencies(&mut served);
    let expected = percentile(&served, 0.95).unwrap();
    assert!((exported - expected).abs() < 1e-9, "{} vs {}", exported, expected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_metrics_before_any_request() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;
    let body = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(metric_value(&body, "app_request_latency_p95_seconds"), Some(0.0));
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_paths_share_one_request_series() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;
    let http = reqwest::Client::new();

    for i in 0..200 {
        let resp = http
            .get(format!("http://{}/junk{}", addr, i))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    let body = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let series: Vec<&str> = body
        .lines()
        .filter(|line| line.starts_with("app_requests_total{"))
        .collect();
    assert_eq!(series.len(), 2, "{:?}", series);
    assert!(body.contains("app_requests_total{endpoint=\"other\"} 200"));
    assert!(body.contains("app_requests_total{endpoint=\"/metrics\"} 1"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_toggle_and_status_endpoints() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;
    let control = client(addr);

    let health = control.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.device, DeviceMode::Gpu);
    assert_eq!(health.speedup_factor, 4.0);

    assert_eq!(control.toggle_device().await.unwrap(), DeviceMode::Cpu);
    let status = control.device_status().await.unwrap();
    assert!(!status.gpu_simulation);
    assert_eq!(status.device, DeviceMode::Cpu);

    let resp = control
        .process(&WorkloadDescriptor::new(64, 64, 1))
        .await
        .unwrap();
    assert_eq!(resp.device, DeviceMode::Cpu);
    assert_eq!(resp.pixels, "64x64");

    assert_eq!(control.toggle_device().await.unwrap(), DeviceMode::Gpu);
    assert_eq!(control.health().await.unwrap().toggles, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_process_defaults_and_validation() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{}/process", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["pixels"], "1280x720");
    assert_eq!(json["iters"], 5);

    for query in ["pixels=abc", "pixels=0x10", "iters=0", "iters=many", "pixels=9000x9000"] {
        let resp = http
            .post(format!("http://{}/process?{}", addr, query))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", query);
    }
    assert_eq!(server.gauge().len(), 1);

    let resp = http
        .get(format!("http://{}/unknown", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_access_log_counts_requests() {
    let (server, addr) = spawn_server(server_config(DeviceMode::Gpu, quick_simulator())).await;
    let control = client(addr);
    control.health().await.unwrap();
    control.device_status().await.unwrap();
    assert_eq!(server.access_log().total_entries(), 2);
    server.shutdown().await;
}
