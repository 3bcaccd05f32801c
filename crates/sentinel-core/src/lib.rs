#![warn(missing_docs)]
//! # sentinel-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `sentinel` workspace.
//!
//! ## Responsibilities
//! - Represent raw captured rasters ([`Frame`]) and optional crop rectangles.
//! - Describe stored capture images ([`CaptureImage`]) as served to viewers.
//! - Own the capture filename scheme that keeps lexicographic order equal to
//!   chronological order.
//! - Format timestamps as RFC 3339 for every JSON surface.
//!
//! ## Data flow
//! Capture backends emit [`Frame`] values, optionally narrowed with
//! [`Frame::crop`]. The encoded bytes are stored under [`capture_filename`] and
//! later listed back as [`CaptureImage`] records.
//!
//! ## Ownership and lifetimes
//! Frames own their backing buffers (`Vec<u8>`) so they can cross from the
//! capture worker thread into the encoder without borrow coupling.
//!
//! ## Error model
//! Validation failures (shape mismatch, degenerate or out-of-bounds crop,
//! unformattable timestamp) return [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! This crate never logs frame bytes. Filenames produced here contain only
//! ASCII digits, `_` and the fixed prefix/extension.
//!
//! ## Example
//! ```rust
//! use sentinel_core::{CropRegion, Frame};
//!
//! let frame = Frame::new("display-1", 4, 4, 0, vec![0; 64]).unwrap();
//! let region = CropRegion::new(1, 1, 2, 2).expect("valid region");
//! let cropped = frame.crop(region).unwrap();
//! assert_eq!((cropped.width, cropped.height), (2, 2));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// File extension used for every stored capture.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Prefix shared by every capture filename.
pub const CAPTURE_FILENAME_PREFIX: &str = "screenshot_";

/// Represents one raw raster captured from a display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Display identity reported by the capture backend.
    pub screen_id: String,
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// Capture time in Unix epoch milliseconds.
    pub captured_at_ms: u64,
    /// Raw RGBA pixel buffer (`width * height * 4` bytes).
    pub rgba: Vec<u8>,
}

impl Frame {
    /// Constructs a validated frame.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidFrameShape`] when the pixel buffer length is
    /// not exactly `width * height * 4`.
    pub fn new(
        screen_id: impl Into<String>,
        width: u32,
        height: u32,
        captured_at_ms: u64,
        rgba: Vec<u8>,
    ) -> Result<Self, CoreError> {
        let expected_len = required_rgba_len(width, height)?;
        if rgba.len() != expected_len {
            return Err(CoreError::InvalidFrameShape {
                expected: expected_len,
                actual: rgba.len(),
            });
        }

        Ok(Self {
            screen_id: screen_id.into(),
            width,
            height,
            captured_at_ms,
            rgba,
        })
    }

    /// Returns the sub-rectangle of this frame described by `region`.
    ///
    /// The region is clamped to the frame bounds, so a rectangle hanging over
    /// the right or bottom edge yields the visible part only.
    ///
    /// # Errors
    /// Returns [`CoreError::CropOutOfBounds`] when the region does not
    /// intersect the frame at all.
    pub fn crop(&self, region: CropRegion) -> Result<Frame, CoreError> {
        if region.x >= self.width || region.y >= self.height || region.is_empty() {
            return Err(CoreError::CropOutOfBounds {
                region,
                width: self.width,
                height: self.height,
            });
        }

        let crop_width = region.width.min(self.width - region.x);
        let crop_height = region.height.min(self.height - region.y);
        let row_len = crop_width as usize * 4;
        let mut rgba = Vec::with_capacity(required_rgba_len(crop_width, crop_height)?);

        for y in region.y..region.y + crop_height {
            let src_offset = (y as usize * self.width as usize + region.x as usize) * 4;
            rgba.extend_from_slice(&self.rgba[src_offset..src_offset + row_len]);
        }

        Frame::new(
            self.screen_id.clone(),
            crop_width,
            crop_height,
            self.captured_at_ms,
            rgba,
        )
    }
}

/// Pixel-space rectangle restricting capture to a sub-area of the display.
///
/// Coordinates are device pixels relative to the top-left corner of the
/// captured display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CropRegion {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRegion {
    /// Creates a validated crop region.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidCropRegion`] when width or height is zero.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self, CoreError> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidCropRegion(format!(
                "width and height must be greater than zero, got {width}x{height}"
            )));
        }

        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Returns `true` when the rectangle covers no pixels.
    ///
    /// Capture treats an empty region exactly like "no crop".
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

impl FromStr for CropRegion {
    type Err = CoreError;

    /// Parses `x,y,width,height` (commas or whitespace as separators).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect();

        let [x, y, width, height] = parts.as_slice() else {
            return Err(CoreError::InvalidCropRegion(format!(
                "expected four values `x,y,width,height`, got `{raw}`"
            )));
        };

        let parse = |value: &str| {
            value.parse::<u32>().map_err(|_| {
                CoreError::InvalidCropRegion(format!("`{value}` is not a pixel coordinate"))
            })
        };

        CropRegion::new(parse(x)?, parse(y)?, parse(width)?, parse(height)?)
    }
}

/// One image currently held by the image store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureImage {
    /// Store-relative filename.
    pub filename: String,
    /// Last modification time of the stored file.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: OffsetDateTime,
    /// File size in bytes.
    #[serde(rename = "size")]
    pub byte_size: u64,
}

/// Builds the store filename for a capture taken at `at`.
///
/// The layout is `screenshot_YYYYMMDD_HHMMSS_mmm.jpg` in UTC. Every field is
/// zero-padded, so lexicographic order equals chronological order.
pub fn capture_filename(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    format!(
        "{CAPTURE_FILENAME_PREFIX}{:04}{:02}{:02}_{:02}{:02}{:02}_{:03}.{IMAGE_EXTENSION}",
        at.year(),
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.millisecond()
    )
}

/// Formats `at` as an RFC 3339 UTC timestamp with millisecond precision.
///
/// # Errors
/// Returns [`CoreError::Timestamp`] when the value cannot be represented
/// (years outside `0..=9999`).
pub fn format_rfc3339(at: OffsetDateTime) -> Result<String, CoreError> {
    let at = at.to_offset(UtcOffset::UTC);
    let at = at
        .replace_nanosecond(u32::from(at.millisecond()) * 1_000_000)
        .unwrap_or(at);
    at.format(&Rfc3339).map_err(CoreError::Timestamp)
}

/// `serde` adapter writing an [`OffsetDateTime`] through [`format_rfc3339`].
///
/// # Errors
/// Propagates formatting failures as serializer errors.
pub fn serialize_rfc3339<S>(at: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let formatted = format_rfc3339(*at).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}

/// Converts a capture time in epoch milliseconds into a UTC timestamp.
pub fn timestamp_from_millis(epoch_ms: u64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Returns the current time in Unix epoch milliseconds.
pub fn unix_timestamp_millis() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    u64::try_from(nanos).unwrap_or(0)
}

/// Error type for core model validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Frame buffer shape does not match declared geometry.
    #[error("invalid frame shape: expected {expected} bytes, got {actual}")]
    InvalidFrameShape {
        /// Expected RGBA byte count.
        expected: usize,
        /// Actual RGBA byte count.
        actual: usize,
    },
    /// Crop rectangle is malformed.
    #[error("invalid crop region: {0}")]
    InvalidCropRegion(String),
    /// Crop rectangle does not intersect the captured frame.
    #[error("crop region {region} lies outside the {width}x{height} frame")]
    CropOutOfBounds {
        /// Requested region.
        region: CropRegion,
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
    },
    /// Frame dimensions overflow addressable memory.
    #[error("frame dimensions overflow")]
    DimensionOverflow,
    /// Timestamp could not be formatted.
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
}

fn required_rgba_len(width: u32, height: u32) -> Result<usize, CoreError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(CoreError::DimensionOverflow)
}

#[cfg(test)]
mod tests {
    //! Unit tests for frame and crop validation.

    use super::*;

    fn numbered_frame(width: u32, height: u32) -> Frame {
        let mut rgba = Vec::new();
        for index in 0..(width * height) {
            rgba.extend_from_slice(&[index as u8, 0, 0, 255]);
        }
        Frame::new("display-1", width, height, 7, rgba).expect("frame should be valid")
    }

    #[test]
    fn frame_rejects_mismatched_buffer() {
        let error = Frame::new("display-1", 2, 2, 0, vec![0; 15]).unwrap_err();
        assert!(matches!(
            error,
            CoreError::InvalidFrameShape {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn crop_copies_requested_rows() {
        let frame = numbered_frame(4, 3);
        let cropped = frame
            .crop(CropRegion::new(1, 1, 2, 2).unwrap())
            .expect("crop should succeed");

        assert_eq!((cropped.width, cropped.height), (2, 2));
        let first_channel: Vec<u8> = cropped.rgba.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(first_channel, vec![5, 6, 9, 10]);
        assert_eq!(cropped.captured_at_ms, 7);
    }

    #[test]
    fn crop_clamps_to_frame_edges() {
        let frame = numbered_frame(4, 4);
        let cropped = frame.crop(CropRegion::new(3, 2, 10, 10).unwrap()).unwrap();
        assert_eq!((cropped.width, cropped.height), (1, 2));
    }

    #[test]
    fn crop_outside_frame_is_rejected() {
        let frame = numbered_frame(2, 2);
        assert!(matches!(
            frame.crop(CropRegion::new(5, 0, 1, 1).unwrap()),
            Err(CoreError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn crop_region_requires_positive_size() {
        assert!(CropRegion::new(0, 0, 0, 10).is_err());
        assert!(CropRegion::new(0, 0, 10, 0).is_err());
    }

    #[test]
    fn crop_region_parses_both_separators() {
        let comma: CropRegion = "10,20,300,400".parse().unwrap();
        let spaced: CropRegion = "10 20 300 400".parse().unwrap();
        assert_eq!(comma, spaced);
        assert_eq!(comma, CropRegion::new(10, 20, 300, 400).unwrap());
        assert!("10,20,300".parse::<CropRegion>().is_err());
        assert!("a,b,c,d".parse::<CropRegion>().is_err());
    }
}
