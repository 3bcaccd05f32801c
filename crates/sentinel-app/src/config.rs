//! Environment-driven agent configuration.
//!
//! Every setting has a default; values that fail validation are logged and
//! replaced by that default so a typo never prevents startup.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sentinel_capture::JpegQuality;
use sentinel_core::CropRegion;
use sentinel_events::DEFAULT_EVENT_CAPACITY;
use tracing::warn;

use crate::AgentError;

/// Capture intervals offered to operators, in seconds.
pub const ALLOWED_INTERVAL_SECS: [u64; 6] = [2, 3, 5, 10, 15, 30];

/// Retention counts offered to operators.
pub const ALLOWED_RETENTION_COUNTS: [usize; 5] = [3, 5, 10, 20, 50];

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8000;

/// Timer period between automatic captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInterval(u64);

impl CaptureInterval {
    /// Validates `secs` against [`ALLOWED_INTERVAL_SECS`].
    ///
    /// # Errors
    /// Returns [`AgentError::InvalidSetting`] for any other value.
    pub fn from_secs(secs: u64) -> Result<Self, AgentError> {
        if ALLOWED_INTERVAL_SECS.contains(&secs) {
            Ok(Self(secs))
        } else {
            Err(AgentError::InvalidSetting {
                name: "capture interval",
                value: secs.to_string(),
                reason: format!("allowed seconds: {ALLOWED_INTERVAL_SECS:?}"),
            })
        }
    }

    /// Interval in seconds.
    pub fn secs(&self) -> u64 {
        self.0
    }

    /// Interval as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for CaptureInterval {
    fn default() -> Self {
        Self(5)
    }
}

/// Number of images kept by the retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCount(usize);

impl RetentionCount {
    /// Validates `count` against [`ALLOWED_RETENTION_COUNTS`].
    ///
    /// # Errors
    /// Returns [`AgentError::InvalidSetting`] for any other value.
    pub fn new(count: usize) -> Result<Self, AgentError> {
        if ALLOWED_RETENTION_COUNTS.contains(&count) {
            Ok(Self(count))
        } else {
            Err(AgentError::InvalidSetting {
                name: "retention count",
                value: count.to_string(),
                reason: format!("allowed counts: {ALLOWED_RETENTION_COUNTS:?}"),
            })
        }
    }

    /// Number of images kept.
    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for RetentionCount {
    fn default() -> Self {
        Self(5)
    }
}

/// Which capture backend the agent drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Real display capture.
    #[default]
    Real,
    /// Generated gradient frames; for headless hosts and demos.
    Synthetic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Real => f.write_str("real"),
            BackendKind::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// Resolved agent settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Address the HTTP server binds.
    pub bind: IpAddr,
    /// HTTP port; `0` picks an ephemeral port.
    pub port: u16,
    /// Automatic capture period.
    pub interval: CaptureInterval,
    /// Images kept on disk.
    pub retention: RetentionCount,
    /// JPEG quality factor.
    pub jpeg_quality: JpegQuality,
    /// Event log capacity.
    pub max_events: usize,
    /// Optional crop applied to every capture.
    pub crop: Option<CropRegion>,
    /// Image store directory.
    pub storage_dir: PathBuf,
    /// Directory for `sentinel.log`.
    pub log_dir: PathBuf,
    /// Capture backend selection.
    pub backend: BackendKind,
    /// When `false`, the capture timer never fires; triggers still work.
    pub capture_enabled: bool,
}

impl AgentConfig {
    /// Defaults with directories placed under `base_dir`.
    pub fn defaults_in(base_dir: &Path) -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            interval: CaptureInterval::default(),
            retention: RetentionCount::default(),
            jpeg_quality: JpegQuality::default(),
            max_events: DEFAULT_EVENT_CAPACITY,
            crop: None,
            storage_dir: base_dir.join("captures"),
            log_dir: base_dir.join("logs"),
            backend: BackendKind::Real,
            capture_enabled: true,
        }
    }

    /// Reads `SENTINEL_*` variables from the process environment.
    ///
    /// Default directories sit next to the executable.
    pub fn from_env() -> Self {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_lookup(|name| std::env::var(name).ok(), &base_dir)
    }

    /// Resolves settings through `lookup`, falling back to defaults.
    pub fn from_lookup<F>(lookup: F, base_dir: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::defaults_in(base_dir);
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(raw) = read("SENTINEL_BIND") {
            apply(&mut config.bind, "SENTINEL_BIND", &raw, |raw| {
                raw.parse::<IpAddr>().map_err(|error| error.to_string())
            });
        }
        if let Some(raw) = read("SENTINEL_PORT") {
            apply(&mut config.port, "SENTINEL_PORT", &raw, |raw| {
                raw.parse::<u16>().map_err(|error| error.to_string())
            });
        }
        if let Some(raw) = read("SENTINEL_CAPTURE_INTERVAL_SECS") {
            apply(&mut config.interval, "SENTINEL_CAPTURE_INTERVAL_SECS", &raw, |raw| {
                let secs = raw.parse::<u64>().map_err(|error| error.to_string())?;
                CaptureInterval::from_secs(secs).map_err(|error| error.to_string())
            });
        }
        if let Some(raw) = read("SENTINEL_KEEP_IMAGES") {
            apply(&mut config.retention, "SENTINEL_KEEP_IMAGES", &raw, |raw| {
                let count = raw.parse::<usize>().map_err(|error| error.to_string())?;
                RetentionCount::new(count).map_err(|error| error.to_string())
            });
        }
        if let Some(raw) = read("SENTINEL_JPEG_QUALITY") {
            apply(&mut config.jpeg_quality, "SENTINEL_JPEG_QUALITY", &raw, |raw| {
                let factor = raw.parse::<f32>().map_err(|error| error.to_string())?;
                JpegQuality::new(factor).map_err(|error| error.to_string())
            });
        }
        if let Some(raw) = read("SENTINEL_MAX_EVENTS") {
            apply(&mut config.max_events, "SENTINEL_MAX_EVENTS", &raw, |raw| {
                match raw.parse::<usize>() {
                    Ok(0) => Err("must be at least 1".to_string()),
                    Ok(count) => Ok(count),
                    Err(error) => Err(error.to_string()),
                }
            });
        }
        if let Some(raw) = read("SENTINEL_CROP") {
            apply(&mut config.crop, "SENTINEL_CROP", &raw, |raw| {
                raw.parse::<CropRegion>()
                    .map(Some)
                    .map_err(|error| error.to_string())
            });
        }
        if let Some(raw) = read("SENTINEL_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(raw);
        }
        if let Some(raw) = read("SENTINEL_LOG_DIR") {
            config.log_dir = PathBuf::from(raw);
        }
        if let Some(raw) = read("SENTINEL_CAPTURE_BACKEND") {
            apply(&mut config.backend, "SENTINEL_CAPTURE_BACKEND", &raw, |raw| {
                match raw.to_ascii_lowercase().as_str() {
                    "real" => Ok(BackendKind::Real),
                    "synthetic" => Ok(BackendKind::Synthetic),
                    _ => Err("expected `real` or `synthetic`".to_string()),
                }
            });
        }
        config.capture_enabled = crate::capture_enabled(read("SENTINEL_CAPTURE_ENABLED").as_deref());

        config
    }

    /// Socket address for the HTTP listener.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn apply<T, F>(slot: &mut T, name: &str, raw: &str, parse: F)
where
    F: FnOnce(&str) -> Result<T, String>,
{
    match parse(raw) {
        Ok(value) => *slot = value,
        Err(reason) => warn!(variable = name, value = raw, %reason, "invalid setting; using default"),
    }
}
