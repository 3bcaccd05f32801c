//! Shared fixtures for http integration tests.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sentinel_events::EventLog;
use sentinel_http::{CaptureTrigger, HttpServer, Router, ServerHandle};
use sentinel_store::ImageStore;
use tempfile::TempDir;

/// Trigger that only counts invocations.
#[derive(Default)]
pub struct RecordingTrigger {
    calls: AtomicUsize,
}

impl RecordingTrigger {
    /// Number of trigger calls so far.
    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CaptureTrigger for RecordingTrigger {
    fn trigger_capture(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Router plus the services behind it, backed by a throwaway directory.
pub struct Fixture {
    /// Keeps the store directory alive.
    #[allow(dead_code)]
    pub dir: TempDir,
    pub store: Arc<ImageStore>,
    pub events: Arc<EventLog>,
    pub trigger: Arc<RecordingTrigger>,
}

impl Fixture {
    /// Creates empty services.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = Arc::new(ImageStore::new(dir.path().join("captures")));
        Self {
            dir,
            store,
            events: Arc::new(EventLog::new(50)),
            trigger: Arc::new(RecordingTrigger::default()),
        }
    }

    /// Builds a router over the fixture services.
    pub fn router(&self) -> Router {
        let trigger: Arc<dyn CaptureTrigger> = self.trigger.clone();
        Router::new(Arc::clone(&self.store), Arc::clone(&self.events), trigger)
    }

    /// Starts a server on an ephemeral loopback port.
    #[allow(dead_code)]
    pub fn serve(&self) -> ServerHandle {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("loopback address");
        HttpServer::new(self.router())
            .start(addr)
            .expect("server should bind an ephemeral port")
    }
}

/// Parsed raw response.
#[allow(dead_code)]
pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

/// Sends `raw` over a fresh connection and reads until the server closes it.
#[allow(dead_code)]
pub fn send_raw(addr: SocketAddr, raw: &[u8]) -> RawResponse {
    let mut stream = TcpStream::connect(addr).expect("connect to test server");
    stream.write_all(raw).expect("send request");
    let mut wire = Vec::new();
    stream.read_to_end(&mut wire).expect("read response");

    let split = wire
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .expect("response head terminator");
    let head = String::from_utf8(wire[..split].to_vec()).expect("ascii head");
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status code");
    RawResponse {
        status,
        head,
        body: wire[split + 4..].to_vec(),
    }
}

/// Sends a header-only request.
#[allow(dead_code)]
pub fn request(addr: SocketAddr, method: &str, path: &str) -> RawResponse {
    let raw = format!("{method} {path} HTTP/1.1\r\nHost: test\r\n\r\n");
    send_raw(addr, raw.as_bytes())
}
