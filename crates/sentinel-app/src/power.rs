//! Sleep-prevention lease held for the duration of each capture.
//!
//! A [`PowerGuard`] owns at most one [`InhibitLease`] at a time, which makes
//! `acquire` and `release` idempotent. Leases come from a [`SleepInhibitor`];
//! the platform one spawns a helper process that holds an OS idle-sleep
//! assertion until it is killed.

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

/// Active sleep-prevention assertion. Releasing consumes the lease.
pub trait InhibitLease: Send {
    /// Drops the assertion.
    fn release(self: Box<Self>);
}

/// Source of sleep-prevention leases.
pub trait SleepInhibitor: Send + Sync {
    /// Takes a new assertion labelled with `reason`.
    ///
    /// # Errors
    /// Returns [`PowerError`] when the platform refuses the assertion.
    fn inhibit(&self, reason: &str) -> Result<Box<dyn InhibitLease>, PowerError>;
}

/// Idempotent holder of a single lease.
pub struct PowerGuard {
    inhibitor: Arc<dyn SleepInhibitor>,
    lease: Mutex<Option<Box<dyn InhibitLease>>>,
}

impl PowerGuard {
    /// Creates a guard drawing leases from `inhibitor`.
    pub fn new(inhibitor: Arc<dyn SleepInhibitor>) -> Self {
        Self {
            inhibitor,
            lease: Mutex::new(None),
        }
    }

    /// Takes a lease unless one is already held.
    ///
    /// Returns `true` once sleep is prevented; asking again while held is a
    /// no-op that also returns `true`.
    ///
    /// # Errors
    /// Propagates inhibitor failures; the guard stays unheld.
    pub fn acquire(&self, reason: &str) -> Result<bool, PowerError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Ok(true);
        }
        *slot = Some(self.inhibitor.inhibit(reason)?);
        debug!(reason, "sleep prevention acquired");
        Ok(true)
    }

    /// Releases the held lease, if any.
    ///
    /// Returns `true` once sleep is allowed again; releasing while idle is a
    /// no-op that also returns `true`.
    pub fn release(&self) -> bool {
        if let Some(lease) = self.slot().take() {
            lease.release();
            debug!("sleep prevention released");
        }
        true
    }

    fn slot(&self) -> MutexGuard<'_, Option<Box<dyn InhibitLease>>> {
        self.lease.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PowerGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Inhibitor that grants leases without touching the system.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInhibitor;

struct NoopLease;

impl InhibitLease for NoopLease {
    fn release(self: Box<Self>) {}
}

impl SleepInhibitor for NoopInhibitor {
    fn inhibit(&self, _reason: &str) -> Result<Box<dyn InhibitLease>, PowerError> {
        Ok(Box::new(NoopLease))
    }
}

/// Inhibitor backed by a long-running helper process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessInhibitor {
    /// macOS `caffeinate -i -w <pid>`.
    Caffeinate,
    /// Linux `systemd-inhibit --what=idle ... sleep infinity`.
    SystemdInhibit,
}

impl ProcessInhibitor {
    fn command(&self, reason: &str) -> Command {
        match self {
            ProcessInhibitor::Caffeinate => {
                let mut command = Command::new("caffeinate");
                command
                    .arg("-i")
                    .arg("-w")
                    .arg(std::process::id().to_string());
                command
            }
            ProcessInhibitor::SystemdInhibit => {
                let mut command = Command::new("systemd-inhibit");
                command
                    .arg("--what=idle")
                    .arg("--who=sentinel")
                    .arg(format!("--why={reason}"))
                    .arg("sleep")
                    .arg("infinity");
                command
            }
        }
    }

    fn program(&self) -> &'static str {
        match self {
            ProcessInhibitor::Caffeinate => "caffeinate",
            ProcessInhibitor::SystemdInhibit => "systemd-inhibit",
        }
    }
}

struct ProcessLease {
    child: Child,
}

impl InhibitLease for ProcessLease {
    // Dropping the box stops the helper.
    fn release(self: Box<Self>) {}
}

impl Drop for ProcessLease {
    fn drop(&mut self) {
        if let Err(error) = self.child.kill() {
            warn!(%error, "failed to stop sleep-prevention helper");
        }
        let _ = self.child.wait();
    }
}

impl SleepInhibitor for ProcessInhibitor {
    fn inhibit(&self, reason: &str) -> Result<Box<dyn InhibitLease>, PowerError> {
        let child = self
            .command(reason)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PowerError::Spawn {
                program: self.program(),
                source,
            })?;
        Ok(Box::new(ProcessLease { child }))
    }
}

/// Picks the inhibitor for the current platform.
pub fn platform_inhibitor() -> Arc<dyn SleepInhibitor> {
    if cfg!(target_os = "macos") {
        Arc::new(ProcessInhibitor::Caffeinate)
    } else if cfg!(target_os = "linux") {
        Arc::new(ProcessInhibitor::SystemdInhibit)
    } else {
        Arc::new(NoopInhibitor)
    }
}

/// Sleep-prevention error type.
#[derive(Debug, Error)]
pub enum PowerError {
    /// Helper process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Helper program name.
        program: &'static str,
        /// Underlying spawn error.
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    //! Unit tests for lease bookkeeping.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        taken: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    struct CountingLease(Arc<AtomicUsize>);

    impl InhibitLease for CountingLease {
        fn release(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl SleepInhibitor for Counting {
        fn inhibit(&self, _reason: &str) -> Result<Box<dyn InhibitLease>, PowerError> {
            self.taken.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingLease(Arc::clone(&self.released))))
        }
    }

    #[test]
    fn acquire_and_release_are_idempotent() {
        let inhibitor = Counting::default();
        let taken = Arc::clone(&inhibitor.taken);
        let released = Arc::clone(&inhibitor.released);
        let guard = PowerGuard::new(Arc::new(inhibitor));

        assert!(guard.acquire("capture").unwrap());
        assert!(guard.acquire("capture").unwrap());
        assert_eq!(taken.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        assert!(guard.release());
        assert!(guard.release());
        assert_eq!(taken.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        assert!(guard.acquire("capture").unwrap());
        assert_eq!(taken.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropping_the_guard_releases_its_lease() {
        let inhibitor = Counting::default();
        let released = Arc::clone(&inhibitor.released);
        let guard = PowerGuard::new(Arc::new(inhibitor));
        guard.acquire("capture").unwrap();
        drop(guard);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_inhibit_leaves_guard_unheld() {
        struct Refusing;
        impl SleepInhibitor for Refusing {
            fn inhibit(&self, _reason: &str) -> Result<Box<dyn InhibitLease>, PowerError> {
                Err(PowerError::Spawn {
                    program: "missing",
                    source: io::Error::from(io::ErrorKind::NotFound),
                })
            }
        }

        let guard = PowerGuard::new(Arc::new(Refusing));
        assert!(guard.acquire("capture").is_err());
        assert!(guard.lease.lock().unwrap().is_none());
    }
}
