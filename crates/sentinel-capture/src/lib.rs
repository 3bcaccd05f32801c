#![warn(missing_docs)]
//! # sentinel-capture
//!
//! ## Purpose
//! Provides the capture engine: display acquisition plus JPEG encoding.
//!
//! ## Responsibilities
//! - Define a backend-agnostic capture trait.
//! - Expose real display capture on supported platforms.
//! - Expose deterministic synthetic capture for CI, demos and tests.
//! - Own the optional crop region read by every capture.
//! - Encode rasters as JPEG at one fixed quality factor.
//!
//! ## Data flow
//! [`CaptureEngine::capture`] picks the primary display -> backend returns a
//! [`sentinel_core::Frame`] -> optional crop -> [`encode_jpeg`] -> bytes handed
//! to the capture controller for storage.
//!
//! ## Ownership and lifetimes
//! Captured frames are owned values with independent buffers; no borrowed frame
//! memory escapes backend boundaries. The crop region lives behind a lock so
//! the control loop can replace it while the worker thread captures.
//!
//! ## Error model
//! Missing displays, backend failures, impossible crops and encoder failures
//! are reported as [`CaptureError`] values. Callers treat every variant as
//! "this cycle failed".
//!
//! ## Security and privacy notes
//! Frame and JPEG bytes are never logged. Persisting them is the store's job.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use sentinel_core::{CropRegion, Frame, unix_timestamp_millis};
use thiserror::Error;
use tracing::debug;

/// Default JPEG quality factor, trading size for fidelity.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.7;

/// Magic header every encoded JPEG starts with.
pub const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Metadata describing one available display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    /// Stable display identifier.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Native display width in pixels.
    pub width: u32,
    /// Native display height in pixels.
    pub height: u32,
    /// Whether the OS reports this display as the primary one.
    pub primary: bool,
}

/// Trait implemented by concrete capture providers.
pub trait CaptureBackend: Send + Sync {
    /// Enumerates available displays.
    fn list_displays(&self) -> Vec<DisplayInfo>;

    /// Captures one frame from selected display.
    ///
    /// # Errors
    /// Returns [`CaptureError::UnknownDisplay`] when display id is invalid.
    fn capture_frame(&self, display_id: &str, captured_at_ms: u64) -> Result<Frame, CaptureError>;
}

/// JPEG quality factor in `(0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JpegQuality(f32);

impl JpegQuality {
    /// Creates a validated quality factor.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidQuality`] for values outside `(0.0, 1.0]`
    /// or non-finite input.
    pub fn new(factor: f32) -> Result<Self, CaptureError> {
        if !factor.is_finite() || factor <= 0.0 || factor > 1.0 {
            return Err(CaptureError::InvalidQuality(factor));
        }
        Ok(Self(factor))
    }

    /// Returns the raw factor.
    pub fn factor(&self) -> f32 {
        self.0
    }

    /// Maps the factor onto the encoder's `1..=100` scale.
    pub fn encoder_quality(&self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for JpegQuality {
    fn default() -> Self {
        Self(DEFAULT_JPEG_QUALITY)
    }
}

/// Captures the primary display (or a crop of it) and encodes it as JPEG.
pub struct CaptureEngine {
    backend: Arc<dyn CaptureBackend>,
    quality: JpegQuality,
    crop_region: RwLock<Option<CropRegion>>,
}

impl CaptureEngine {
    /// Creates an engine in full-display mode.
    pub fn new(backend: Arc<dyn CaptureBackend>, quality: JpegQuality) -> Self {
        Self {
            backend,
            quality,
            crop_region: RwLock::new(None),
        }
    }

    /// Returns the configured quality factor.
    pub fn quality(&self) -> JpegQuality {
        self.quality
    }

    /// Replaces the crop region; `None` (or an empty region) means full display.
    pub fn set_crop_region(&self, region: Option<CropRegion>) {
        let region = region.filter(|region| !region.is_empty());
        *self
            .crop_region
            .write()
            .unwrap_or_else(PoisonError::into_inner) = region;
    }

    /// Returns the crop region used by subsequent captures.
    pub fn crop_region(&self) -> Option<CropRegion> {
        *self
            .crop_region
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Captures with the engine's current crop region.
    ///
    /// # Errors
    /// See [`CaptureEngine::capture_with`].
    pub fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        self.capture_with(self.crop_region())
    }

    /// Captures the primary display, or the sub-rectangle `region`.
    ///
    /// An empty region is treated as "no crop".
    ///
    /// # Errors
    /// Returns [`CaptureError::NoDisplay`] when no display is available,
    /// [`CaptureError::Crop`] when the region misses the display, and backend
    /// or encoder failures otherwise.
    pub fn capture_with(&self, region: Option<CropRegion>) -> Result<Vec<u8>, CaptureError> {
        let primary =
            primary_display(&self.backend.list_displays()).ok_or(CaptureError::NoDisplay)?;
        let frame = self
            .backend
            .capture_frame(&primary.id, unix_timestamp_millis())?;

        let frame = match region.filter(|region| !region.is_empty()) {
            Some(region) => frame.crop(region).map_err(CaptureError::Crop)?,
            None => frame,
        };

        let bytes = encode_jpeg(&frame, self.quality)?;
        debug!(
            display_id = %primary.id,
            width = frame.width,
            height = frame.height,
            encoded_bytes = bytes.len(),
            "frame encoded"
        );
        Ok(bytes)
    }
}

/// Picks the primary display, falling back to the first one reported.
pub fn primary_display(displays: &[DisplayInfo]) -> Option<DisplayInfo> {
    displays
        .iter()
        .find(|display| display.primary)
        .or_else(|| displays.first())
        .cloned()
}

/// Encodes a frame as a complete baseline JPEG image.
///
/// # Errors
/// Returns [`CaptureError::Encode`] when the encoder rejects the raster.
pub fn encode_jpeg(frame: &Frame, quality: JpegQuality) -> Result<Vec<u8>, CaptureError> {
    let rgb = rgba_to_rgb(&frame.rgba)?;
    let mut jpeg_bytes = Vec::new();

    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.encoder_quality())
        .encode(&rgb, frame.width, frame.height, image::ColorType::Rgb8.into())
        .map_err(|error| CaptureError::Encode(error.to_string()))?;

    Ok(jpeg_bytes)
}

fn rgba_to_rgb(rgba: &[u8]) -> Result<Vec<u8>, CaptureError> {
    if rgba.len() % 4 != 0 {
        return Err(CaptureError::Encode(format!(
            "invalid RGBA buffer length {}; expected multiple of 4",
            rgba.len()
        )));
    }

    let mut rgb = Vec::with_capacity((rgba.len() / 4) * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }

    Ok(rgb)
}

/// Real display capture backend for supported desktop targets.
///
/// # Notes
/// The backend snapshots display metadata at initialization and reacquires
/// current screen handles for each capture call.
#[derive(Debug, Clone)]
pub struct RealCaptureBackend {
    displays: Vec<RealDisplayRecord>,
}

#[derive(Debug, Clone)]
struct RealDisplayRecord {
    #[cfg(any(windows, target_os = "macos"))]
    index: usize,
    info: DisplayInfo,
}

impl RealCaptureBackend {
    /// Creates a backend that reports no displays.
    ///
    /// Every capture through it fails with [`CaptureError::NoDisplay`]; the
    /// agent uses it when discovery fails so the rest of the system keeps
    /// running.
    pub fn without_displays() -> Self {
        Self {
            displays: Vec::new(),
        }
    }

    /// Discovers currently available displays and creates a real capture backend.
    ///
    /// # Errors
    /// Returns [`CaptureError::Backend`] when display enumeration fails or
    /// [`CaptureError::NoDisplay`] when no displays are available.
    pub fn discover() -> Result<Self, CaptureError> {
        #[cfg(any(windows, target_os = "macos"))]
        {
            use screenshots::Screen;

            let screens = Screen::all().map_err(|error| {
                CaptureError::Backend(format!("screen enumeration failed: {error}"))
            })?;

            if screens.is_empty() {
                return Err(CaptureError::NoDisplay);
            }

            let mut displays = Vec::with_capacity(screens.len());
            for (index, screen) in screens.into_iter().enumerate() {
                let width = screen.display_info.width.max(1) as u32;
                let height = screen.display_info.height.max(1) as u32;
                let primary = screen.display_info.x == 0 && screen.display_info.y == 0;
                displays.push(RealDisplayRecord {
                    index,
                    info: DisplayInfo {
                        id: format!("real-display-{index}"),
                        name: format!("Display {}", index + 1),
                        width,
                        height,
                        primary,
                    },
                });
            }

            Ok(Self { displays })
        }

        #[cfg(not(any(windows, target_os = "macos")))]
        {
            Err(CaptureError::Backend(
                "real capture backend is implemented for Windows and macOS only".to_string(),
            ))
        }
    }
}

impl CaptureBackend for RealCaptureBackend {
    fn list_displays(&self) -> Vec<DisplayInfo> {
        self.displays
            .iter()
            .map(|record| record.info.clone())
            .collect()
    }

    fn capture_frame(&self, display_id: &str, captured_at_ms: u64) -> Result<Frame, CaptureError> {
        let record = self
            .displays
            .iter()
            .find(|record| record.info.id == display_id)
            .ok_or_else(|| CaptureError::UnknownDisplay(display_id.to_string()))?;

        #[cfg(any(windows, target_os = "macos"))]
        {
            use screenshots::Screen;

            let screens = Screen::all().map_err(|error| {
                CaptureError::Backend(format!("screen refresh failed: {error}"))
            })?;
            let screen = screens.get(record.index).ok_or_else(|| {
                CaptureError::Backend(format!(
                    "display index {} is not available anymore",
                    record.index
                ))
            })?;

            let captured = screen.capture().map_err(|error| {
                CaptureError::Backend(format!("screen capture failed: {error}"))
            })?;
            let width = captured.width();
            let height = captured.height();
            let rgba = captured.into_raw();

            Frame::new(record.info.id.clone(), width, height, captured_at_ms, rgba)
                .map_err(|error| CaptureError::Backend(error.to_string()))
        }

        #[cfg(not(any(windows, target_os = "macos")))]
        {
            let _ = record;
            let _ = captured_at_ms;
            Err(CaptureError::Backend(
                "real capture backend is implemented for Windows and macOS only".to_string(),
            ))
        }
    }
}

/// Deterministic synthetic backend for tests, CI and headless demos.
///
/// Frames carry a horizontal/vertical gradient plus a per-capture sequence
/// byte, so consecutive captures encode to different JPEGs.
#[derive(Debug)]
pub struct SyntheticCaptureBackend {
    displays: Vec<DisplayInfo>,
    delay: Duration,
    sequence: Mutex<u64>,
}

impl SyntheticCaptureBackend {
    /// Creates synthetic backend with one default 64x48 display.
    pub fn new() -> Self {
        Self::with_displays(vec![DisplayInfo {
            id: "display-1".to_string(),
            name: "Synthetic Display".to_string(),
            width: 64,
            height: 48,
            primary: true,
        }])
    }

    /// Creates backend with caller-provided display list.
    pub fn with_displays(displays: Vec<DisplayInfo>) -> Self {
        Self {
            displays,
            delay: Duration::ZERO,
            sequence: Mutex::new(0),
        }
    }

    /// Makes every capture block for `delay`, simulating a slow raster grab.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns how many frames were produced so far.
    pub fn captures(&self) -> u64 {
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SyntheticCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticCaptureBackend {
    fn list_displays(&self) -> Vec<DisplayInfo> {
        self.displays.clone()
    }

    fn capture_frame(&self, display_id: &str, captured_at_ms: u64) -> Result<Frame, CaptureError> {
        let display = self
            .displays
            .iter()
            .find(|display| display.id == display_id)
            .ok_or_else(|| CaptureError::UnknownDisplay(display_id.to_string()))?;

        let sequence = {
            let mut sequence = self
                .sequence
                .lock()
                .map_err(|_| CaptureError::Backend("synthetic sequence lock poisoned".to_string()))?;
            *sequence += 1;
            *sequence
        };

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let width = display.width.max(1);
        let height = display.height.max(1);
        let marker = (sequence % 255) as u8;
        let mut rgba = Vec::with_capacity((width as usize) * (height as usize) * 4);
        for y in 0..height {
            for x in 0..width {
                let red = (x * 255 / width) as u8;
                let green = (y * 255 / height) as u8;
                rgba.extend_from_slice(&[red, green, marker, 255]);
            }
        }

        Frame::new(display.id.clone(), width, height, captured_at_ms, rgba)
            .map_err(|error| CaptureError::Backend(error.to_string()))
    }
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No display is available to capture.
    #[error("no display available for capture")]
    NoDisplay,
    /// Requested display is unknown to backend.
    #[error("unknown display: {0}")]
    UnknownDisplay(String),
    /// Backend runtime failure (including missing capture permission).
    #[error("capture backend failure: {0}")]
    Backend(String),
    /// Crop region could not be applied to the captured frame.
    #[error("crop failed: {0}")]
    Crop(sentinel_core::CoreError),
    /// JPEG encoding failed.
    #[error("jpeg encoding failed: {0}")]
    Encode(String),
    /// Quality factor is outside `(0.0, 1.0]`.
    #[error("invalid jpeg quality {0}: must be in (0.0, 1.0]")]
    InvalidQuality(f32),
}
