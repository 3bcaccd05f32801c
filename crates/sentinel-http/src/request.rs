//! Request model and request-line parsing.

use std::io::{self, Read};

use thiserror::Error;

/// Upper bound on bytes read from one connection.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// The parts of a request that influence routing.
///
/// Headers may follow the request line but are never interpreted, and no
/// endpoint reads a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, verbatim (`GET`, `POST`, ...).
    pub method: String,
    /// Request target with any query string removed.
    pub path: String,
}

impl HttpRequest {
    /// Parses the request line at the start of `raw`.
    ///
    /// The target is split on the first `?` and the query part discarded.
    ///
    /// # Errors
    /// Returns [`ParseError`] when the input is empty, the request line is not
    /// UTF-8, or it has fewer than two parts.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let line_end = raw
            .iter()
            .position(|byte| *byte == b'\n')
            .unwrap_or(raw.len());
        let line = std::str::from_utf8(&raw[..line_end]).map_err(|_| ParseError::NotUtf8)?;
        let line = line.trim_end_matches('\r');

        let mut parts = line.split_whitespace();
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return Err(ParseError::MalformedRequestLine(line.to_string()));
        };

        let path = target.split_once('?').map_or(target, |(path, _)| path);

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
        })
    }
}

/// Reads the request head from `reader`.
///
/// Stops at the blank line ending the header block, at EOF, or after
/// [`MAX_REQUEST_BYTES`], whichever comes first.
///
/// # Errors
/// Propagates read failures other than `Interrupted`.
pub fn read_request_head<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 4096];

    while buffer.len() < MAX_REQUEST_BYTES {
        let limit = chunk.len().min(MAX_REQUEST_BYTES - buffer.len());
        let read = match reader.read(&mut chunk[..limit]) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };

        buffer.extend_from_slice(&chunk[..read]);
        if head_complete(&buffer) {
            break;
        }
    }

    Ok(buffer)
}

fn head_complete(buffer: &[u8]) -> bool {
    buffer.windows(4).any(|window| window == b"\r\n\r\n")
        || buffer.windows(2).any(|window| window == b"\n\n")
}

/// Request parsing failure; always answered with 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Connection delivered no bytes.
    #[error("empty request")]
    Empty,
    /// Request line is not valid UTF-8.
    #[error("request line is not valid utf-8")]
    NotUtf8,
    /// Request line has fewer than two parts.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
}
