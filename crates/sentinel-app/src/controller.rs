//! Single-flight capture controller.
//!
//! A capture is requested from the timer, the HTTP trigger or the console. At
//! most one capture runs at a time across all of them: the first request that
//! wins the `busy` flag hands a job to the capture worker thread, and every
//! request arriving before that job finishes is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use sentinel_capture::{CaptureEngine, CaptureError};
use sentinel_core::capture_filename;
use sentinel_http::CaptureTrigger;
use sentinel_store::{ImageStore, RetentionPolicy, StoreError};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::AgentError;
use crate::power::PowerGuard;

/// What asked for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOrigin {
    /// The automatic capture timer.
    Timer,
    /// `POST /trigger-capture`.
    Trigger,
    /// The operator console.
    Manual,
    /// The one-off check run at startup.
    Probe,
}

impl fmt::Display for CaptureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureOrigin::Timer => "timer",
            CaptureOrigin::Trigger => "trigger",
            CaptureOrigin::Manual => "manual",
            CaptureOrigin::Probe => "probe",
        };
        f.write_str(name)
    }
}

/// Outcome of [`CaptureController::request_capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    /// The capture was handed to the worker.
    Started,
    /// Another capture is running; this request was discarded.
    Dropped,
}

/// Counters exposed to status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Captures written to the store.
    pub captures: u64,
    /// Captures that failed before reaching the store.
    pub failures: u64,
    /// Time of the last stored capture.
    pub last_capture_at: Option<OffsetDateTime>,
    /// Filename of the last stored capture.
    pub last_filename: Option<String>,
}

/// Failure of one capture cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Raster grab or encode failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// Writing the image failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Shared {
    engine: Arc<CaptureEngine>,
    store: Arc<ImageStore>,
    retention: Arc<RetentionPolicy>,
    power: PowerGuard,
    busy: AtomicBool,
    stats: Mutex<CaptureStats>,
}

/// Releases the single-flight slot when the cycle ends, however it ends.
struct SlotRelease<'a>(&'a AtomicBool);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn run_cycle(&self, origin: CaptureOrigin) {
        let started = Instant::now();
        if let Err(error) = self.power.acquire("screen capture") {
            warn!(%error, "sleep prevention unavailable; capturing anyway");
        }
        let outcome = self.capture_and_store();
        self.power.release();

        let mut stats = self.stats();
        match outcome {
            Ok((filename, at)) => {
                stats.captures += 1;
                stats.last_capture_at = Some(at);
                stats.last_filename = Some(filename.clone());
                info!(
                    %origin,
                    filename,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "capture stored"
                );
            }
            Err(error) => {
                stats.failures += 1;
                warn!(%origin, %error, "capture failed");
            }
        }
    }

    fn capture_and_store(&self) -> Result<(String, OffsetDateTime), CycleError> {
        let bytes = self.engine.capture()?;
        let at = OffsetDateTime::now_utc();
        let filename = capture_filename(at);
        self.store.write(&filename, &bytes)?;

        // A failed retention pass leaves extra images behind until the next one.
        if let Err(error) = self.retention.apply(&self.store) {
            warn!(%error, "retention pass failed");
        }
        Ok((filename, at))
    }

    fn stats(&self) -> MutexGuard<'_, CaptureStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Schedules captures onto a dedicated worker thread, one at a time.
pub struct CaptureController {
    shared: Arc<Shared>,
    jobs: Mutex<Option<Sender<CaptureOrigin>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureController {
    /// Creates the controller and starts its worker thread.
    ///
    /// # Errors
    /// Returns [`AgentError::Spawn`] when the worker thread cannot start.
    pub fn new(
        engine: Arc<CaptureEngine>,
        store: Arc<ImageStore>,
        retention: Arc<RetentionPolicy>,
        power: PowerGuard,
    ) -> Result<Self, AgentError> {
        let shared = Arc::new(Shared {
            engine,
            store,
            retention,
            power,
            busy: AtomicBool::new(false),
            stats: Mutex::new(CaptureStats::default()),
        });

        let (jobs, job_rx) = mpsc::channel::<CaptureOrigin>();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("sentinel-capture-worker".to_string())
            .spawn(move || capture_worker(worker_shared, job_rx))
            .map_err(|source| AgentError::Spawn {
                name: "capture worker",
                source,
            })?;

        Ok(Self {
            shared,
            jobs: Mutex::new(Some(jobs)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Requests one capture and returns without waiting for it.
    ///
    /// Returns [`CaptureRequest::Dropped`] when a capture is already running
    /// or the worker has shut down.
    pub fn request_capture(&self, origin: CaptureOrigin) -> CaptureRequest {
        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%origin, "capture already running; request dropped");
            return CaptureRequest::Dropped;
        }

        let sent = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|jobs| jobs.send(origin).is_ok());
        if !sent {
            self.shared.busy.store(false, Ordering::Release);
            warn!(%origin, "capture worker is gone; request dropped");
            return CaptureRequest::Dropped;
        }

        CaptureRequest::Started
    }

    /// Returns `true` while a capture is queued or running.
    pub fn is_capturing(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Snapshot of the capture counters.
    pub fn stats(&self) -> CaptureStats {
        self.shared.stats().clone()
    }

    /// Runs one capture synchronously on the calling thread, without storing
    /// it, to surface permission or display problems early.
    ///
    /// # Errors
    /// Returns the engine's [`CaptureError`].
    pub fn probe(&self) -> Result<usize, CaptureError> {
        let bytes = self.shared.engine.capture()?;
        debug!(origin = %CaptureOrigin::Probe, encoded_bytes = bytes.len(), "capture probe succeeded");
        Ok(bytes.len())
    }

    /// Stops accepting captures and waits for the worker to finish its job.
    pub fn shutdown(&self) {
        drop(
            self.jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("capture worker panicked");
            }
            debug!("capture worker stopped");
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CaptureTrigger for CaptureController {
    fn trigger_capture(&self) {
        self.request_capture(CaptureOrigin::Trigger);
    }
}

fn capture_worker(shared: Arc<Shared>, jobs: Receiver<CaptureOrigin>) {
    while let Ok(origin) = jobs.recv() {
        let _slot = SlotRelease(&shared.busy);
        shared.run_cycle(origin);
    }
}
