//! Response model and wire encoding.

use serde::Serialize;
use serde_json::json;

/// Status codes the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200.
    Ok,
    /// 400.
    BadRequest,
    /// 404.
    NotFound,
    /// 500.
    InternalServerError,
}

impl StatusCode {
    /// Numeric status code.
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Reason phrase for the status line.
    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete response: status, headers and body bytes.
///
/// `Content-Length` and `Connection` are always derived at encode time and
/// cannot be overridden through [`HttpResponse::with_header`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

const JSON_CONTENT_TYPE: &str = "application/json";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

impl HttpResponse {
    /// Creates a response with a content type and raw body.
    pub fn new(status: StatusCode, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    /// Serializes `value` as a JSON body with the cross-origin header viewers
    /// need.
    ///
    /// Falls back to a 500 error body if serialization fails.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, JSON_CONTENT_TYPE, body)
                .with_header("Access-Control-Allow-Origin", "*"),
            Err(error) => {
                tracing::error!(%error, "response serialization failed");
                Self::error(StatusCode::InternalServerError, "Internal Server Error")
            }
        }
    }

    /// JSON error body `{"error": message}`.
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = json!({ "error": message }).to_string().into_bytes();
        Self::new(status, JSON_CONTENT_TYPE, body).with_header("Access-Control-Allow-Origin", "*")
    }

    /// Uncached HTML page.
    pub fn html(body: &str) -> Self {
        Self::new(StatusCode::Ok, HTML_CONTENT_TYPE, body.as_bytes().to_vec())
            .with_header("Cache-Control", "no-cache")
    }

    /// Uncached binary body (images).
    pub fn bytes(content_type: &str, body: Vec<u8>) -> Self {
        Self::new(StatusCode::Ok, content_type, body).with_header("Cache-Control", "no-cache")
    }

    /// Adds a header. CR and LF are removed from both name and value.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((strip_line_breaks(name), strip_line_breaks(value)));
        self
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the first header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Encodes the response for the wire.
    ///
    /// Layout: status line, headers, `Content-Length` (body length in bytes),
    /// `Connection: close`, blank line, body.
    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n",
            self.status.code(),
            self.status.reason()
        );
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection")
            {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Connection: close\r\n\r\n");

        let mut wire = head.into_bytes();
        wire.extend_from_slice(&self.body);
        wire
    }
}

fn strip_line_breaks(raw: &str) -> String {
    raw.chars().filter(|ch| *ch != '\r' && *ch != '\n').collect()
}
