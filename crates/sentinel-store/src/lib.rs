#![warn(missing_docs)]
//! # sentinel-store
//!
//! ## Purpose
//! Directory-backed persistence for captured images plus the retention policy
//! that bounds how many of them stay on disk.
//!
//! ## Responsibilities
//! - List, read, write and delete capture images inside one directory.
//! - Reject traversal attempts before any filesystem access.
//! - Evict everything beyond the `K` most recent images after each write.
//!
//! ## Data flow
//! Capture controller -> [`ImageStore::write`] -> [`RetentionPolicy::apply`].
//! HTTP handlers -> [`ImageStore::list`] / [`ImageStore::read`].
//!
//! ## Ownership and lifetimes
//! The store owns its root path and one mutex that serializes every directory
//! operation; callers share it behind an `Arc`.
//!
//! ## Error model
//! Name validation, missing files and I/O failures surface as [`StoreError`].
//! Deletion is best-effort: failures are logged and reported as `false`.
//!
//! ## Security and privacy notes
//! Names containing `..`, path separators or NUL are rejected, and resolved
//! paths must sit directly inside the store root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use sentinel_core::{CaptureImage, IMAGE_EXTENSION};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Extension of in-progress writes; never listed.
const PARTIAL_EXTENSION: &str = "partial";

/// Directory-backed image store.
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
    lock: Mutex<()>,
}

/// Outcome of one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Images left in the store.
    pub kept: usize,
    /// Images deleted by this pass.
    pub evicted: usize,
    /// Images that should have been deleted but could not be.
    pub failed: usize,
}

impl ImageStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists stored images, newest first.
    ///
    /// Ordering is by modification time descending, ties broken by filename
    /// descending. A missing store directory lists as empty.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the directory cannot be scanned.
    pub fn list(&self) -> Result<Vec<CaptureImage>, StoreError> {
        let _guard = self.guard()?;
        self.list_unlocked()
    }

    /// Reads the full content of one stored image.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidName`] for traversal attempts,
    /// [`StoreError::NotFound`] when no such image exists, and
    /// [`StoreError::Io`] for other read failures.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(name)?;
        let _guard = self.guard()?;

        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(name.to_string()),
            _ => StoreError::Io { path, source },
        })
    }

    /// Writes `bytes` as image `name`, creating the store directory if needed.
    ///
    /// The content is staged under a `.partial` name and renamed into place, so
    /// listings never observe a half-written image.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidName`] for unsafe names and
    /// [`StoreError::Io`] when the directory or file cannot be written.
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        let _guard = self.guard()?;

        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let staging = self.root.join(format!("{name}.{PARTIAL_EXTENSION}"));
        fs::write(&staging, bytes).map_err(|source| StoreError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| {
            let _ = fs::remove_file(&staging);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })
    }

    /// Deletes image `name`. Best-effort: failures are logged and reported as
    /// `false`.
    pub fn delete(&self, name: &str) -> bool {
        let path = match self.resolve(name) {
            Ok(path) => path,
            Err(error) => {
                warn!(name, %error, "refusing to delete image");
                return false;
            }
        };

        match self.guard() {
            Ok(_guard) => delete_path(&path),
            Err(error) => {
                warn!(name, %error, "image delete skipped");
                false
            }
        }
    }

    /// Deletes every image beyond the `keep` most recent ones.
    ///
    /// Listing and deletion happen under one lock acquisition, so a concurrent
    /// request never observes a half-applied pass. `keep == 0` empties the
    /// store.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the directory cannot be listed.
    /// Individual deletion failures are counted in [`RetentionReport::failed`].
    pub fn retain_newest(&self, keep: usize) -> Result<RetentionReport, StoreError> {
        let _guard = self.guard()?;
        let images = self.list_unlocked()?;

        let mut report = RetentionReport {
            kept: images.len().min(keep),
            ..RetentionReport::default()
        };

        for image in images.iter().skip(keep) {
            if delete_path(&self.root.join(&image.filename)) {
                report.evicted += 1;
            } else {
                report.failed += 1;
                report.kept += 1;
            }
        }

        Ok(report)
    }

    fn list_unlocked(&self) -> Result<Vec<CaptureImage>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(IMAGE_EXTENSION) {
                continue;
            }

            // Entries can vanish between read_dir and metadata; skip them.
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            let timestamp = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);

            images.push(CaptureImage {
                filename: filename.to_string(),
                timestamp,
                byte_size: metadata.len(),
            });
        }

        images.sort_by(|left, right| {
            right
                .timestamp
                .cmp(&left.timestamp)
                .then_with(|| right.filename.cmp(&left.filename))
        });
        Ok(images)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        let path = self.root.join(name);
        if path.parent() != Some(self.root.as_path()) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(path)
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.lock.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Rejects names that could escape the store directory.
///
/// # Errors
/// Returns [`StoreError::InvalidName`] for empty names and names containing
/// `..`, `/`, `\` or NUL.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty()
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn delete_path(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "image deleted");
            true
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "image delete failed");
            false
        }
    }
}

/// Keeps the `K` most recent images after every successful write.
#[derive(Debug)]
pub struct RetentionPolicy {
    keep: AtomicUsize,
}

impl RetentionPolicy {
    /// Creates a policy keeping `keep` images.
    pub fn new(keep: usize) -> Self {
        Self {
            keep: AtomicUsize::new(keep),
        }
    }

    /// Returns the current retention count.
    pub fn keep(&self) -> usize {
        self.keep.load(Ordering::Relaxed)
    }

    /// Changes the retention count; applies from the next pass on.
    pub fn set_keep(&self, keep: usize) {
        self.keep.store(keep, Ordering::Relaxed);
    }

    /// Runs one retention pass against `store`.
    ///
    /// # Errors
    /// Propagates listing failures from [`ImageStore::retain_newest`].
    pub fn apply(&self, store: &ImageStore) -> Result<RetentionReport, StoreError> {
        let report = store.retain_newest(self.keep())?;
        if report.evicted > 0 || report.failed > 0 {
            debug!(
                kept = report.kept,
                evicted = report.evicted,
                failed = report.failed,
                "retention pass finished"
            );
        }
        Ok(report)
    }
}

/// Image store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Name would resolve outside the store directory.
    #[error("invalid image name: {0:?}")]
    InvalidName(String),
    /// No image with this name exists.
    #[error("image not found: {0}")]
    NotFound(String),
    /// Filesystem operation failed.
    #[error("store i/o failure at {}: {source}", .path.display())]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Store mutex was poisoned by a panicking holder.
    #[error("image store lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    //! Unit tests for name validation.

    use super::*;

    #[test]
    fn rejects_traversal_and_separators() {
        for name in ["", "..", "../etc/passwd", "a/b.jpg", "a\\b.jpg", "x..y.jpg", "nul\0.jpg"] {
            assert!(
                matches!(validate_name(name), Err(StoreError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_capture_filenames() {
        validate_name("screenshot_20240101_000000_000.jpg").expect("name should pass");
    }
}
