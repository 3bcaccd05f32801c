#![warn(missing_docs)]
//! # sentinel-http
//!
//! ## Purpose
//! Embedded, dependency-free HTTP/1.1 subset serving capture history and the
//! activity log to viewers on the local network.
//!
//! ## Responsibilities
//! - Accept TCP connections on a dedicated thread ([`server`]).
//! - Parse exactly one request line per connection ([`request`]).
//! - Map `(method, path)` to a handler ([`router`]).
//! - Encode responses with an exact `Content-Length` and `Connection: close`
//!   ([`response`]).
//!
//! ## Data flow
//! Listener -> connection thread -> [`HttpRequest::parse`] -> [`Router::route`]
//! -> {image store | event log | capture trigger} -> [`HttpResponse::encode`]
//! -> socket close.
//!
//! ## Ownership and lifetimes
//! The router holds `Arc` handles to the shared services; every connection
//! thread gets its own `Arc<Router>` clone and owns its `TcpStream`.
//!
//! ## Error model
//! Only binding the listener is fatal ([`ServerError::Bind`]). Parse failures
//! become 400 responses; read/write failures abort the affected connection.
//!
//! ## Security and privacy notes
//! Image names are validated by the store before any filesystem access.
//! Header values are stripped of CR/LF and JSON bodies are produced by
//! `serde_json`, so request data cannot inject headers or break bodies.

pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use request::{HttpRequest, MAX_REQUEST_BYTES, ParseError};
pub use response::{HttpResponse, StatusCode};
pub use router::{CaptureTrigger, Router};
pub use server::{HttpServer, ServerError, ServerHandle};
