//! Integration tests for the capture engine.

use std::sync::Arc;

use image::GenericImageView;
use sentinel_capture::{
    CaptureBackend, CaptureEngine, CaptureError, JPEG_MAGIC, JpegQuality, RealCaptureBackend,
    SyntheticCaptureBackend,
};
use sentinel_core::CropRegion;

fn engine() -> CaptureEngine {
    CaptureEngine::new(Arc::new(SyntheticCaptureBackend::new()), JpegQuality::default())
}

fn decoded_dimensions(bytes: &[u8]) -> (u32, u32) {
    image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
        .expect("output should decode as jpeg")
        .dimensions()
}

#[test]
fn capture_engine_tests_full_display_is_valid_jpeg() {
    let bytes = engine().capture().expect("capture should succeed");
    assert_eq!(&bytes[..3], &JPEG_MAGIC);
    assert_eq!(decoded_dimensions(&bytes), (64, 48));
}

#[test]
fn capture_engine_tests_crop_region_narrows_output() {
    let engine = engine();
    engine.set_crop_region(Some(CropRegion::new(8, 4, 16, 12).unwrap()));

    let bytes = engine.capture().expect("cropped capture should succeed");
    assert_eq!(&bytes[..3], &JPEG_MAGIC);
    assert_eq!(decoded_dimensions(&bytes), (16, 12));

    engine.set_crop_region(None);
    let bytes = engine.capture().expect("full capture should succeed");
    assert_eq!(decoded_dimensions(&bytes), (64, 48));
}

#[test]
fn capture_engine_tests_empty_region_means_full_display() {
    let region = CropRegion {
        x: 3,
        y: 3,
        width: 0,
        height: 9,
    };
    let bytes = engine()
        .capture_with(Some(region))
        .expect("empty region should not fail");
    assert_eq!(decoded_dimensions(&bytes), (64, 48));
}

#[test]
fn capture_engine_tests_region_outside_display_fails() {
    let result = engine().capture_with(Some(CropRegion::new(500, 500, 10, 10).unwrap()));
    assert!(matches!(result, Err(CaptureError::Crop(_))));
}

#[test]
fn capture_engine_tests_no_display_fails() {
    let engine = CaptureEngine::new(
        Arc::new(SyntheticCaptureBackend::with_displays(Vec::new())),
        JpegQuality::default(),
    );
    assert!(matches!(engine.capture(), Err(CaptureError::NoDisplay)));
}

#[test]
fn capture_engine_tests_display_less_real_backend_reports_no_display() {
    let backend = RealCaptureBackend::without_displays();
    assert!(backend.list_displays().is_empty());

    let engine = CaptureEngine::new(Arc::new(backend), JpegQuality::default());
    assert!(matches!(engine.capture(), Err(CaptureError::NoDisplay)));
}
