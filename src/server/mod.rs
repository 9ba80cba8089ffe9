//! Server orchestrator
//!
//! The simulated GPU media processing service
//!
//! Ties together device state, the processing simulator, the rolling p95
//! gauge and observability behind one HTTP/1 listener.

mod handler;
pub mod types;

pub use handler::AppState;
pub use types::{
    DeviceStatusResponse, ErrorResponse, HealthResponse, ProcessResponse, ToggleResponse,
};

use crate::config::ServerConfig;
use crate::device::DeviceState;
use crate::error::{BenchError, Result};
use crate::gauge::RollingGauge;
use crate::observability::{AccessLog, ServiceMetrics};
use crate::simulator::ProcessingSimulator;
use crate::ServerState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

pub struct Server {
    config: ServerConfig,
    state: RwLock<ServerState>,
    app: Arc<AppState>,
    local_addr: RwLock<Option<SocketAddr>>,
    accept_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Server {
    /// Build every server component from a validated configuration
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let device = Arc::new(DeviceState::new(
            config.device.mode,
            config.device.speedup_factor,
        )?);
        let gauge = Arc::new(RollingGauge::new(config.gauge.capacity));
        let simulator = ProcessingSimulator::new(config.simulator.clone(), device, gauge);

        Ok(Self {
            app: Arc::new(AppState {
                simulator,
                metrics: Arc::new(ServiceMetrics::new()),
                access_log: Arc::new(AccessLog::new()),
            }),
            config,
            state: RwLock::new(ServerState::Created),
            local_addr: RwLock::new(None),
            accept_handle: Mutex::new(None),
        })
    }

    /// Bind the listener and start accepting connections
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.state() != ServerState::Created {
            return Err(BenchError::State(format!(
                "server is {} and cannot be started",
                self.state()
            )));
        }
        self.set_state(ServerState::Starting);

        let addr: SocketAddr = self.config.listen.parse().map_err(|e| {
            BenchError::Config(format!("Invalid listen address '{}': {}", self.config.listen, e))
        })?;
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                self.set_state(ServerState::Stopped);
                return Err(BenchError::Other(format!("Failed to bind {}: {}", addr, e)));
            }
        };
        let local = listener.local_addr()?;

        let device = self.app.simulator.device().snapshot();
        tracing::info!(
            address = %local,
            device = %device.mode,
            speedup_factor = device.speedup_factor,
            gauge_capacity = self.config.gauge.capacity,
            failure_rate = self.config.simulator.failure_rate,
            "HTTP server listening"
        );

        let app = self.app.clone();
        let handle = tokio::spawn(accept_loop(listener, app));

        *self
            .local_addr
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(local);
        *self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.set_state(ServerState::Running);

        Ok(local)
    }

    /// Stop accepting connections and wait for in-flight requests to drain
    pub async fn shutdown(&self) {
        match self.state() {
            ServerState::Stopping | ServerState::Stopped => return,
            _ => {}
        }
        self.set_state(ServerState::Stopping);
        tracing::info!("Server shutting down");

        let handle = self
            .accept_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.app.metrics.in_flight() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let remaining = self.app.metrics.in_flight();
        if remaining > 0 {
            tracing::warn!(in_flight = remaining, "Shutdown timeout reached with requests in flight");
        }

        self.set_state(ServerState::Stopped);
        tracing::info!("Server stopped");
    }

    /// Wait for Ctrl+C, then shut down
    pub async fn wait_for_shutdown(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        self.shutdown().await;
    }

    pub fn state(&self) -> ServerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Bound address once started; useful when listening on port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<DeviceState> {
        self.app.simulator.device()
    }

    pub fn gauge(&self) -> &Arc<RollingGauge> {
        self.app.simulator.gauge()
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.app.metrics
    }

    pub fn access_log(&self) -> &Arc<AccessLog> {
        &self.app.access_log
    }

    fn set_state(&self, new_state: ServerState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = %*state, to = %new_state, "State transition");
        *state = new_state;
    }
}

async fn accept_loop(listener: TcpListener, app: Arc<AppState>) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let app = app.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(e) = http1::Builder::new()
                .serve_connection(
                    io,
                    service_fn(|req| handler::handle_http_request(req, remote_addr, app.clone())),
                )
                .await
            {
                tracing::debug!(error = %e, client = %remote_addr, "Connection closed with error");
            }
        });
    }
}
