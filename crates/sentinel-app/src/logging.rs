//! Process-wide tracing subscriber.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::AgentError;

/// Name of the append-only log file inside the log directory.
pub const LOG_FILE_NAME: &str = "sentinel.log";

/// Installs the global subscriber: `RUST_LOG` filter (default `info`), a
/// stderr layer and a plaintext append-only file layer in `log_dir`.
///
/// Returns the log file path.
///
/// # Errors
/// Returns [`AgentError::Io`] when the log file cannot be opened and
/// [`AgentError::Logging`] when a global subscriber is already installed.
pub fn init(log_dir: &Path) -> Result<PathBuf, AgentError> {
    fs::create_dir_all(log_dir).map_err(|source| AgentError::Io {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let path = log_dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| AgentError::Io {
            path: path.clone(),
            source,
        })?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .map_err(|error| AgentError::Logging(error.to_string()))?;

    Ok(path)
}

/// Installs a stderr-only subscriber; used when the log file is unavailable.
///
/// # Errors
/// Returns [`AgentError::Logging`] when a global subscriber is already installed.
pub fn init_stderr() -> Result<(), AgentError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|error| AgentError::Logging(error.to_string()))
}
