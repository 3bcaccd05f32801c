#![warn(missing_docs)]
//! # sentinel binary
//!
//! Starts the agent from `SENTINEL_*` environment settings and serves the
//! operator console on stdin until `quit`.

use std::io;
use std::process::ExitCode;

use sentinel_app::console::{self, ConsoleExit};
use sentinel_app::{Agent, AgentConfig, app_version, logging};
use tracing::{error, info};

/// CLI entry point.
fn main() -> ExitCode {
    let config = AgentConfig::from_env();

    match logging::init(&config.log_dir) {
        Ok(path) => info!(log_file = %path.display(), "logging initialized"),
        Err(init_error) => {
            eprintln!("file logging unavailable: {init_error}");
            if let Err(fallback_error) = logging::init_stderr() {
                eprintln!("logging unavailable: {fallback_error}");
            }
        }
    }
    info!(version = app_version(), "sentinel {}", app_version());

    let agent = match Agent::start(config) {
        Ok(agent) => agent,
        Err(start_error) => {
            error!(error = %start_error, "sentinel failed to start");
            return ExitCode::FAILURE;
        }
    };

    match console::run_console(io::stdin().lock(), io::stdout(), &agent) {
        ConsoleExit::Quit => {
            info!("quit requested");
            agent.shutdown();
        }
        ConsoleExit::Closed => {
            info!("console input closed; running until terminated");
            agent.wait();
        }
    }
    ExitCode::SUCCESS
}
