//! Request handling for the simulated processing service

use super::types::{
    DeviceStatusResponse, ErrorResponse, HealthResponse, ProcessResponse, ToggleResponse,
};
use crate::device::DeviceMode;
use crate::error::BenchError;
use crate::observability::{AccessLog, ServiceMetrics};
use crate::simulator::ProcessingSimulator;
use crate::workload::WorkloadDescriptor;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

const DEFAULT_PIXELS: &str = "1280x720";
const DEFAULT_ITERS: u32 = 5;

/// Paths served by this service
const ROUTES: [&str; 5] = [
    "/process",
    "/healthz",
    "/metrics",
    "/toggle-gpu-simulation",
    "/gpu-simulation-status",
];

/// Endpoint label for request counting; unknown paths share one series
pub(crate) fn endpoint_label(path: &str) -> &'static str {
    ROUTES
        .iter()
        .find(|route| **route == path)
        .copied()
        .unwrap_or("other")
}

pub type HttpResponse = hyper::Response<Full<Bytes>>;

/// Shared state for request handling
pub struct AppState {
    pub simulator: ProcessingSimulator,
    pub metrics: Arc<ServiceMetrics>,
    pub access_log: Arc<AccessLog>,
}

/// Decrements the in-flight gauge even if the connection drops mid-request
struct InFlight<'a>(&'a ServiceMetrics);

impl<'a> InFlight<'a> {
    fn enter(metrics: &'a ServiceMetrics) -> Self {
        metrics.inc_in_flight();
        Self(metrics)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.dec_in_flight();
    }
}

pub(crate) async fn handle_http_request(
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<AppState>,
) -> std::result::Result<HttpResponse, hyper::Error> {
    let tracker = state.access_log.start_request(&req, remote_addr);
    let _in_flight = InFlight::enter(&state.metrics);
    state.metrics.record_request(endpoint_label(tracker.path()));

    let (response, device) = route(req.method(), req.uri().path(), req.uri().query(), &state).await;

    let status = response.status().as_u16();
    state.metrics.record_response(status);
    state.access_log.record(&tracker.finish(status, device));

    Ok(response)
}

/// Dispatch one request; also returns the device that served `/process`
pub(crate) async fn route(
    method: &Method,
    path: &str,
    query: Option<&str>,
    state: &AppState,
) -> (HttpResponse, Option<DeviceMode>) {
    match (method, path) {
        (&Method::POST, "/process") => process(query, state).await,
        (&Method::GET, "/healthz") => (health(state), None),
        (&Method::GET, "/metrics") => (metrics(state), None),
        (&Method::POST, "/toggle-gpu-simulation") => (toggle(state), None),
        (&Method::GET, "/gpu-simulation-status") => (device_status(state), None),
        (_, path) if ROUTES.contains(&path) => (
            error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            None,
        ),
        _ => (error_response(StatusCode::NOT_FOUND, "not found"), None),
    }
}

async fn process(query: Option<&str>, state: &AppState) -> (HttpResponse, Option<DeviceMode>) {
    let workload = match workload_from_query(query) {
        Ok(w) => w,
        Err(e) => return (rejection(e), None),
    };

    match state.simulator.process(workload).await {
        Ok(outcome) => {
            let secs = outcome.latency.as_secs_f64();
            state.metrics.observe_latency(secs);
            let body = ProcessResponse {
                ok: true,
                latency_ms: secs * 1000.0,
                device: outcome.device,
                pixels: outcome.workload.pixels(),
                iters: outcome.workload.iteration_count,
            };
            (json_response(StatusCode::OK, &body), Some(outcome.device))
        }
        Err(e) => {
            if matches!(e, BenchError::ServerProcessing { .. }) {
                tracing::warn!(error = %e, "Processing failed");
            }
            (rejection(e), None)
        }
    }
}

fn health(state: &AppState) -> HttpResponse {
    let device = state.simulator.device();
    let snap = device.snapshot();
    json_response(
        StatusCode::OK,
        &HealthResponse {
            ok: true,
            status: "ok".into(),
            device: snap.mode,
            speedup_factor: snap.speedup_factor,
            toggles: device.toggle_count(),
        },
    )
}

fn metrics(state: &AppState) -> HttpResponse {
    let body = state
        .metrics
        .render_prometheus(state.simulator.gauge(), &state.simulator.device().snapshot());
    let mut resp = hyper::Response::new(Full::new(Bytes::from(body)));
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    resp
}

fn toggle(state: &AppState) -> HttpResponse {
    let snap = state.simulator.device().toggle();
    tracing::info!(device = %snap.mode, "Device simulation toggled");
    json_response(
        StatusCode::OK,
        &ToggleResponse {
            ok: true,
            previous: snap.mode.toggled(),
            device: snap.mode,
            gpu_simulation: snap.mode == DeviceMode::Gpu,
        },
    )
}

fn device_status(state: &AppState) -> HttpResponse {
    let snap = state.simulator.device().snapshot();
    json_response(
        StatusCode::OK,
        &DeviceStatusResponse {
            gpu_simulation: snap.mode == DeviceMode::Gpu,
            device: snap.mode,
            speedup_factor: snap.speedup_factor,
        },
    )
}

/// Build a workload from `pixels` and `iters`, falling back to defaults
pub(crate) fn workload_from_query(query: Option<&str>) -> crate::Result<WorkloadDescriptor> {
    let pixels = query_param(query, "pixels").unwrap_or(DEFAULT_PIXELS);
    let iters = match query_param(query, "iters") {
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            BenchError::Config(format!("iters must be a positive integer, got '{}'", raw))
        })?,
        None => DEFAULT_ITERS,
    };
    WorkloadDescriptor::parse(pixels, iters)
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn rejection(err: BenchError) -> HttpResponse {
    let status = match &err {
        BenchError::Config(_) => StatusCode::BAD_REQUEST,
        BenchError::ServerProcessing { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match err {
        BenchError::Config(msg) => msg,
        BenchError::ServerProcessing { message, .. } => message,
        other => other.to_string(),
    };
    error_response(status, message)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    json_response(status, &ErrorResponse::new(message))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    let mut resp = hyper::Response::new(Full::new(Bytes::from(bytes)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}
