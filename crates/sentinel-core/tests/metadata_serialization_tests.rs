//! Tests the JSON shape of stored-image metadata.

use sentinel_core::{CaptureImage, format_rfc3339, timestamp_from_millis};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[test]
fn metadata_serialization_tests_uses_viewer_field_names() {
    let image = CaptureImage {
        filename: "screenshot_20240101_000000_000.jpg".to_string(),
        timestamp: timestamp_from_millis(1_704_067_200_123),
        byte_size: 2_048,
    };

    let value = serde_json::to_value(&image).expect("serialization should succeed");
    assert_eq!(value["filename"], "screenshot_20240101_000000_000.jpg");
    assert_eq!(value["size"], 2_048);
    assert_eq!(value["timestamp"], "2024-01-01T00:00:00.123Z");
}

#[test]
fn metadata_serialization_tests_timestamps_parse_back() {
    let now = OffsetDateTime::now_utc();
    let formatted = format_rfc3339(now).expect("current time should format");
    let parsed = OffsetDateTime::parse(&formatted, &Rfc3339).expect("should parse back");
    assert!((parsed - now).abs() < time::Duration::milliseconds(1));
}
