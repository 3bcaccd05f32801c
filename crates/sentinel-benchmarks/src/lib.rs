#![warn(missing_docs)]
//! # sentinel-benchmarks
//!
//! ## Purpose
//! Workload builders shared by the smoke benchmarks under `tests/`.
//!
//! ## Responsibilities
//! - Seed an image store with distinctly named captures.
//! - Fill an event log past its capacity.
//!
//! ## Error model
//! Store failures propagate as [`StoreError`].

use sentinel_core::{capture_filename, timestamp_from_millis};
use sentinel_events::{EventKind, EventLog};
use sentinel_store::{ImageStore, StoreError};

/// Writes `count` placeholder captures one second apart starting at `start_ms`.
///
/// Returns the filenames in write order.
pub fn seed_store(
    store: &ImageStore,
    count: usize,
    start_ms: u64,
    payload: &[u8],
) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::with_capacity(count);
    for index in 0..count as u64 {
        let name = capture_filename(timestamp_from_millis(start_ms + index * 1_000));
        store.write(&name, payload)?;
        names.push(name);
    }
    Ok(names)
}

/// Appends `count` system events with numbered titles.
pub fn flood_events(log: &EventLog, count: usize, body: &str) {
    for index in 0..count {
        log.append(EventKind::System, format!("event {index}"), body);
    }
}
