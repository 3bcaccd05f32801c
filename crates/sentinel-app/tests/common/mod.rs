//! Shared fixtures for app integration tests.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sentinel_app::power::{InhibitLease, NoopInhibitor, PowerError, SleepInhibitor};
use sentinel_app::{AgentConfig, BackendKind, CaptureController, PowerGuard};
use sentinel_capture::{
    CaptureBackend, CaptureEngine, CaptureError, DisplayInfo, JpegQuality,
    SyntheticCaptureBackend,
};
use sentinel_core::Frame;
use sentinel_store::{ImageStore, RetentionPolicy};

/// Polls `condition` every 10 ms until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Synthetic backend that records how many captures overlap.
#[allow(dead_code)]
pub struct OverlapProbe {
    inner: SyntheticCaptureBackend,
    hold: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[allow(dead_code)]
impl OverlapProbe {
    pub fn new(hold: Duration) -> Self {
        Self {
            inner: SyntheticCaptureBackend::new(),
            hold,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> u64 {
        self.inner.captures()
    }
}

impl CaptureBackend for OverlapProbe {
    fn list_displays(&self) -> Vec<DisplayInfo> {
        self.inner.list_displays()
    }

    fn capture_frame(&self, display_id: &str, captured_at_ms: u64) -> Result<Frame, CaptureError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        thread::sleep(self.hold);
        let frame = self.inner.capture_frame(display_id, captured_at_ms);
        self.active.fetch_sub(1, Ordering::SeqCst);
        frame
    }
}

/// Inhibitor counting leases taken and released.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingInhibitor {
    pub taken: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

struct CountingLease(Arc<AtomicUsize>);

impl InhibitLease for CountingLease {
    fn release(self: Box<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl SleepInhibitor for CountingInhibitor {
    fn inhibit(&self, _reason: &str) -> Result<Box<dyn InhibitLease>, PowerError> {
        self.taken.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingLease(Arc::clone(&self.released))))
    }
}

/// Controller over `backend` writing into `dir`.
#[allow(dead_code)]
pub fn controller(
    backend: Arc<dyn CaptureBackend>,
    dir: &Path,
    keep: usize,
    inhibitor: Arc<dyn SleepInhibitor>,
) -> (Arc<CaptureController>, Arc<ImageStore>) {
    let engine = Arc::new(CaptureEngine::new(backend, JpegQuality::default()));
    let store = Arc::new(ImageStore::new(dir));
    let controller = CaptureController::new(
        engine,
        Arc::clone(&store),
        Arc::new(RetentionPolicy::new(keep)),
        PowerGuard::new(inhibitor),
    )
    .expect("controller should start");
    (Arc::new(controller), store)
}

/// Controller with a no-op inhibitor.
#[allow(dead_code)]
pub fn quiet_controller(
    backend: Arc<dyn CaptureBackend>,
    dir: &Path,
    keep: usize,
) -> (Arc<CaptureController>, Arc<ImageStore>) {
    controller(backend, dir, keep, Arc::new(NoopInhibitor))
}

/// Synthetic, timer-less agent config on an ephemeral loopback port.
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> AgentConfig {
    let mut config = AgentConfig::defaults_in(dir);
    config.bind = "127.0.0.1".parse().expect("loopback");
    config.port = 0;
    config.backend = BackendKind::Synthetic;
    config.capture_enabled = false;
    config
}

/// Minimal HTTP exchange: returns status code and body.
#[allow(dead_code)]
pub fn http(addr: SocketAddr, method: &str, path: &str) -> (u16, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    write!(stream, "{method} {path} HTTP/1.1\r\nHost: test\r\n\r\n").expect("send");
    let mut wire = Vec::new();
    stream.read_to_end(&mut wire).expect("read");

    let split = wire
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .expect("head terminator");
    let head = String::from_utf8_lossy(&wire[..split]).to_string();
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    (status, wire[split + 4..].to_vec())
}
