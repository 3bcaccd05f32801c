//! Listener and connection handling.
//!
//! The accept loop polls a non-blocking listener so that [`ServerHandle::stop`]
//! can end it without a wake-up connection. Each accepted connection is served
//! on its own short-lived thread.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::request::{HttpRequest, read_request_head};
use crate::response::{HttpResponse, StatusCode};
use crate::router::Router;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Embedded HTTP server.
pub struct HttpServer {
    router: Arc<Router>,
}

impl HttpServer {
    /// Creates a server dispatching through `router`.
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    /// Binds `addr` and starts accepting on a dedicated thread.
    ///
    /// Port 0 binds an ephemeral port; [`ServerHandle::local_addr`] reports it.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] when the listener cannot be set up and
    /// [`ServerError::Spawn`] when the accept thread cannot be started.
    pub fn start(self, addr: SocketAddr) -> Result<ServerHandle, ServerError> {
        let bind_error = |source| ServerError::Bind { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let stop = Arc::new(AtomicBool::new(false));
        let accept_stop = Arc::clone(&stop);
        let router = self.router;

        let thread = thread::Builder::new()
            .name("sentinel-http-accept".to_string())
            .spawn(move || accept_loop(listener, router, accept_stop))
            .map_err(ServerError::Spawn)?;

        info!(%local_addr, "http server listening");
        Ok(ServerHandle {
            local_addr,
            stop,
            thread: Some(thread),
        })
    }
}

/// Running server. Dropping the handle stops the accept loop.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting new connections and waits for the accept loop to exit.
    ///
    /// Connections already being served finish on their own threads.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("http accept thread panicked");
            }
            info!(local_addr = %self.local_addr, "http server stopped");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(listener: TcpListener, router: Arc<Router>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let router = Arc::clone(&router);
                let spawned = thread::Builder::new()
                    .name("sentinel-http-conn".to_string())
                    .spawn(move || serve_connection(stream, peer, &router));
                if let Err(error) = spawned {
                    warn!(%peer, %error, "connection thread spawn failed");
                }
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                warn!(%error, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn serve_connection(stream: TcpStream, peer: SocketAddr, router: &Router) {
    if let Err(error) = handle_connection(stream, router) {
        warn!(%peer, %error, "connection aborted");
    }
}

/// Serves exactly one request on `stream`, then closes it.
///
/// A connection that delivers no bytes is closed without a response.
///
/// # Errors
/// Returns transport failures; the caller logs them and drops the connection.
pub fn handle_connection(mut stream: TcpStream, router: &Router) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;

    let raw = read_request_head(&mut stream)?;
    if raw.is_empty() {
        debug!("empty connection closed");
        return Ok(());
    }

    let response = match HttpRequest::parse(&raw) {
        Ok(request) => router.route(&request),
        Err(error) => {
            debug!(%error, "rejecting unparseable request");
            HttpResponse::error(StatusCode::BadRequest, "Bad Request")
        }
    };

    stream.write_all(&response.encode())?;
    stream.flush()?;
    // The peer may already be gone; the response has been handed off.
    let _ = stream.shutdown(Shutdown::Write);
    Ok(())
}

/// Server startup error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not be bound or configured.
    #[error("failed to bind http listener on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying socket error.
        source: io::Error,
    },
    /// Accept thread could not be spawned.
    #[error("failed to spawn http accept thread: {0}")]
    Spawn(io::Error),
}
