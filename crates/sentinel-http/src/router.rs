//! `(method, path)` dispatch to the image store, event log and capture trigger.

use std::sync::Arc;

use sentinel_core::serialize_rfc3339;
use sentinel_events::EventLog;
use sentinel_store::{ImageStore, StoreError};
use serde::Serialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::request::HttpRequest;
use crate::response::{HttpResponse, StatusCode};

const VIEWER_PAGE: &str = include_str!("viewer.html");

/// Seam through which `/trigger-capture` reaches the capture controller.
///
/// Implementations must return promptly; the capture itself runs elsewhere.
pub trait CaptureTrigger: Send + Sync {
    /// Requests one capture. Requests made while a capture runs are dropped.
    fn trigger_capture(&self);
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    #[serde(serialize_with = "serialize_rfc3339")]
    timestamp: OffsetDateTime,
}

/// Stateless request dispatcher.
#[derive(Clone)]
pub struct Router {
    store: Arc<ImageStore>,
    events: Arc<EventLog>,
    trigger: Arc<dyn CaptureTrigger>,
}

impl Router {
    /// Creates a router over the shared services.
    pub fn new(
        store: Arc<ImageStore>,
        events: Arc<EventLog>,
        trigger: Arc<dyn CaptureTrigger>,
    ) -> Self {
        Self {
            store,
            events,
            trigger,
        }
    }

    /// Produces the response for one request.
    pub fn route(&self, request: &HttpRequest) -> HttpResponse {
        debug!(method = %request.method, path = %request.path, "routing request");

        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/") => HttpResponse::html(VIEWER_PAGE),
            ("GET", "/health") => HttpResponse::json(
                StatusCode::Ok,
                &Health {
                    status: "healthy",
                    timestamp: OffsetDateTime::now_utc(),
                },
            ),
            ("GET", "/images") => self.list_images(),
            ("POST", "/trigger-capture") => {
                self.trigger.trigger_capture();
                HttpResponse::json(
                    StatusCode::Ok,
                    &json!({ "success": true, "message": "Capture requested" }),
                )
            }
            ("GET", "/notifications") => HttpResponse::json(StatusCode::Ok, &self.events.snapshot()),
            ("POST", "/clear-notifications") => {
                self.events.clear();
                HttpResponse::json(StatusCode::Ok, &json!({ "success": true }))
            }
            ("GET", path) => match path.strip_prefix("/images/") {
                Some(name) => self.serve_image(name),
                None => not_found(),
            },
            _ => not_found(),
        }
    }

    fn list_images(&self) -> HttpResponse {
        match self.store.list() {
            Ok(images) => HttpResponse::json(StatusCode::Ok, &images),
            Err(failure) => {
                error!(error = %failure, "image listing failed");
                HttpResponse::error(StatusCode::InternalServerError, "Internal Server Error")
            }
        }
    }

    fn serve_image(&self, name: &str) -> HttpResponse {
        match self.store.read(name) {
            Ok(bytes) => HttpResponse::bytes(content_type_for(name), bytes),
            Err(StoreError::InvalidName(_)) => {
                HttpResponse::error(StatusCode::BadRequest, "Invalid filename")
            }
            Err(StoreError::NotFound(_)) => {
                HttpResponse::error(StatusCode::NotFound, "Image not found")
            }
            Err(failure) => {
                error!(name, error = %failure, "image read failed");
                HttpResponse::error(StatusCode::NotFound, "Image not found")
            }
        }
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::error(StatusCode::NotFound, "Not Found")
}

/// Maps an image filename to its content type.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for content-type selection.

    use super::*;

    #[test]
    fn jpeg_names_map_to_image_jpeg() {
        assert_eq!(content_type_for("screenshot_1.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
