#![warn(missing_docs)]
//! # sentinel-app
//!
//! ## Purpose
//! Composes capture, storage, the event log and the HTTP server into the
//! running Sentinel agent.
//!
//! ## Responsibilities
//! - Resolve configuration from the environment ([`config`]).
//! - Run single-flight captures on a worker thread ([`controller`]).
//! - Drive the capture timer and operator commands ([`control`]).
//! - Hold a sleep-prevention lease while capturing ([`power`]).
//! - Install process logging ([`logging`]) and read the operator console
//!   ([`console`]).
//!
//! ## Data flow
//! Console / timer / `POST /trigger-capture` -> [`CaptureController`] ->
//! capture engine -> image store -> retention policy. Viewers read the store
//! and event log through the HTTP server.
//!
//! ## Ownership and lifetimes
//! [`Agent`] owns the server handle, the control-loop thread and `Arc`s to the
//! shared services. Dropping or shutting down the agent stops the listener,
//! then the control loop, then the capture worker.
//!
//! ## Error model
//! Startup failures (bind, thread spawn) surface as [`AgentError`]. Runtime
//! capture failures are logged and counted in [`CaptureStats`]; they never
//! stop the agent.
//!
//! ## Security and privacy notes
//! - Capture bytes and event bodies are never written to the process log.
//! - `SENTINEL_CAPTURE_ENABLED=0` disables the capture timer at startup.
//! - The server binds every interface by default; set `SENTINEL_BIND` to
//!   restrict it.

pub mod config;
pub mod console;
pub mod control;
pub mod controller;
pub mod logging;
pub mod power;

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use sentinel_capture::{
    CaptureBackend, CaptureEngine, CaptureError, RealCaptureBackend, SyntheticCaptureBackend,
};
use sentinel_core::{CropRegion, format_rfc3339};
use sentinel_events::{EventLog, EventSink};
use sentinel_http::{CaptureTrigger, HttpServer, Router, ServerError, ServerHandle};
use sentinel_store::{ImageStore, RetentionPolicy, StoreError};
use thiserror::Error;
use tracing::{info, warn};

pub use config::{AgentConfig, BackendKind, CaptureInterval, RetentionCount};
pub use control::{Command, ControlLoop};
pub use controller::{CaptureController, CaptureOrigin, CaptureRequest, CaptureStats};
pub use power::{PowerError, PowerGuard, SleepInhibitor};

/// Build-time application version loaded from the root `VERSION` file.
pub const APP_VERSION: &str = env!("SENTINEL_VERSION");

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Interprets the capture kill-switch value.
///
/// - Unset => capture enabled.
/// - `0`, `false`, `off` (case-insensitive) => capture disabled.
/// - Any other value => capture enabled.
pub fn capture_enabled(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        None => true,
    }
}

/// Best guess at the LAN address viewers should use.
///
/// Connecting a UDP socket sends no packets; it only selects the outbound
/// interface.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Snapshot of the agent's runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    /// Application version.
    pub version: &'static str,
    /// Whether the capture timer is paused.
    pub paused: bool,
    /// Whether the capture timer is allowed to run at all.
    pub timer_enabled: bool,
    /// Capture timer period.
    pub interval_secs: u64,
    /// Images kept by the retention policy.
    pub keep_images: usize,
    /// Active crop region.
    pub crop: Option<CropRegion>,
    /// Whether a capture is running now.
    pub capturing: bool,
    /// Capture counters.
    pub stats: CaptureStats,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timer = match (self.timer_enabled, self.paused) {
            (false, _) => "disabled",
            (true, true) => "paused",
            (true, false) => "running",
        };
        let crop = self
            .crop
            .map_or_else(|| "full screen".to_string(), |region| region.to_string());
        let last = self
            .stats
            .last_capture_at
            .and_then(|at| format_rfc3339(at).ok())
            .unwrap_or_else(|| "never".to_string());

        write!(
            f,
            "sentinel {} | timer {} every {}s | keep {} | region {} | captures {} (failed {}) | last {}{}",
            self.version,
            timer,
            self.interval_secs,
            self.keep_images,
            crop,
            self.stats.captures,
            self.stats.failures,
            last,
            if self.capturing { " | capturing" } else { "" }
        )
    }
}

/// Running agent: HTTP server, control loop and capture worker.
pub struct Agent {
    events: Arc<EventLog>,
    store: Arc<ImageStore>,
    controller: Arc<CaptureController>,
    commands: Sender<Command>,
    control: Option<JoinHandle<()>>,
    server: Option<ServerHandle>,
}

impl Agent {
    /// Starts the agent with the backend named in `config` and the platform
    /// sleep inhibitor.
    ///
    /// When display discovery fails the agent still starts: the failure is
    /// logged and every capture cycle reports [`CaptureError::NoDisplay`].
    ///
    /// # Errors
    /// See [`Agent::start_with`].
    pub fn start(config: AgentConfig) -> Result<Self, AgentError> {
        let backend: Arc<dyn CaptureBackend> = match config.backend {
            BackendKind::Real => match RealCaptureBackend::discover() {
                Ok(backend) => Arc::new(backend),
                Err(error) => {
                    warn!(%error, "display discovery failed; captures will fail until restart");
                    Arc::new(RealCaptureBackend::without_displays())
                }
            },
            BackendKind::Synthetic => Arc::new(SyntheticCaptureBackend::new()),
        };
        Self::start_with(config, backend, power::platform_inhibitor())
    }

    /// Starts the agent over explicit capture and power backends.
    ///
    /// # Errors
    /// Returns [`AgentError::Server`] when the listener cannot bind and
    /// [`AgentError::Spawn`] when a thread cannot start.
    pub fn start_with(
        config: AgentConfig,
        backend: Arc<dyn CaptureBackend>,
        inhibitor: Arc<dyn SleepInhibitor>,
    ) -> Result<Self, AgentError> {
        info!(
            version = app_version(),
            backend = %config.backend,
            storage_dir = %config.storage_dir.display(),
            interval_secs = config.interval.secs(),
            keep_images = config.retention.get(),
            "starting sentinel"
        );

        let engine = Arc::new(CaptureEngine::new(backend, config.jpeg_quality));
        engine.set_crop_region(config.crop);
        let store = Arc::new(ImageStore::new(config.storage_dir.clone()));
        let retention = Arc::new(RetentionPolicy::new(config.retention.get()));
        let events = Arc::new(EventLog::new(config.max_events));

        let controller = Arc::new(CaptureController::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            Arc::clone(&retention),
            PowerGuard::new(inhibitor),
        )?);

        if let Err(error) = controller.probe() {
            warn!(%error, "capture probe failed; check screen recording permission and displays");
        }

        let trigger: Arc<dyn CaptureTrigger> = controller.clone();
        let router = Router::new(Arc::clone(&store), Arc::clone(&events), trigger);
        let server = HttpServer::new(router).start(config.listen_addr())?;
        let port = server.local_addr().port();
        match local_ip() {
            Some(ip) => info!("ready at http://{ip}:{port}"),
            None => info!("ready on port {port}"),
        }

        let sink: Arc<dyn EventSink> = events.clone();
        let (commands, control) = ControlLoop::new(
            Arc::clone(&controller),
            engine,
            retention,
            sink,
            config.interval,
            config.capture_enabled,
        )
        .spawn()?;

        Ok(Self {
            events,
            store,
            controller,
            commands,
            control: Some(control),
            server: Some(server),
        })
    }

    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    /// Event log shared with external event producers.
    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    /// Image store the agent writes to.
    pub fn store(&self) -> &Arc<ImageStore> {
        &self.store
    }

    /// Capture controller.
    pub fn controller(&self) -> &Arc<CaptureController> {
        &self.controller
    }

    /// Sends a command to the control loop.
    ///
    /// # Errors
    /// Returns [`AgentError::ControlClosed`] when the loop has stopped.
    pub fn send(&self, command: Command) -> Result<(), AgentError> {
        self.commands
            .send(command)
            .map_err(|_| AgentError::ControlClosed)
    }

    /// Queries the control loop for a status snapshot.
    ///
    /// # Errors
    /// Returns [`AgentError::ControlClosed`] when the loop has stopped or does
    /// not answer in time.
    pub fn status(&self) -> Result<RuntimeStatus, AgentError> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::Status(reply))?;
        answer
            .recv_timeout(STATUS_TIMEOUT)
            .map_err(|_| AgentError::ControlClosed)
    }

    /// Blocks until the control loop stops.
    pub fn wait(mut self) {
        if let Some(control) = self.control.take() {
            if control.join().is_err() {
                warn!("control loop panicked");
            }
        }
        self.shutdown_inner();
    }

    /// Stops the server, the control loop and the capture worker.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop();
        }
        if let Some(control) = self.control.take() {
            let _ = self.commands.send(Command::Quit);
            if control.join().is_err() {
                warn!("control loop panicked");
            }
        }
        self.controller.shutdown();
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// Agent error type.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A setting is outside its allowed values.
    #[error("invalid {name} `{value}`: {reason}")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// Rejected value.
        value: String,
        /// Allowed values or parse failure.
        reason: String,
    },
    /// Capture backend failure.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// Image store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// HTTP server failure.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
    /// Sleep-prevention failure.
    #[error("power error: {0}")]
    Power(#[from] PowerError),
    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread role.
        name: &'static str,
        /// Underlying error.
        source: io::Error,
    },
    /// Filesystem failure outside the image store.
    #[error("i/o failure at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Logging could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
    /// The control loop is no longer running.
    #[error("control loop is not running")]
    ControlClosed,
}

#[cfg(test)]
mod tests {
    //! Unit tests for the kill switch and status rendering.

    use super::*;

    #[test]
    fn kill_switch_values() {
        assert!(capture_enabled(None));
        assert!(capture_enabled(Some("1")));
        assert!(capture_enabled(Some("yes")));
        for off in ["0", "false", "OFF", " False "] {
            assert!(!capture_enabled(Some(off)), "{off:?} should disable");
        }
    }

    #[test]
    fn status_line_mentions_timer_state() {
        let status = RuntimeStatus {
            version: app_version(),
            paused: true,
            timer_enabled: true,
            interval_secs: 5,
            keep_images: 10,
            crop: None,
            capturing: false,
            stats: CaptureStats::default(),
        };
        let line = status.to_string();
        assert!(line.contains("timer paused every 5s"));
        assert!(line.contains("keep 10"));
        assert!(line.contains("last never"));
    }
}
