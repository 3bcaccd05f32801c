//! Line-oriented operator console.
//!
//! Grammar, one command per line:
//! `capture`, `pause`, `interval <secs>`, `keep <count>`,
//! `crop <x> <y> <w> <h>`, `crop none`, `status`, `quit`.

use std::io::{BufRead, Write};

use sentinel_core::CropRegion;
use thiserror::Error;
use tracing::warn;

use crate::config::{CaptureInterval, RetentionCount};
use crate::control::Command;
use crate::Agent;

/// One parsed console line.
#[derive(Debug)]
pub enum ConsoleInput {
    /// A command for the control loop.
    Command(Command),
    /// Print the runtime status.
    Status,
    /// Nothing to do.
    Blank,
}

/// Why the console stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator asked the agent to quit.
    Quit,
    /// Input reached end of file.
    Closed,
}

/// Console parse failure; reported to the operator, never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    /// First word is not a known command.
    #[error("unknown command `{0}` (try: capture, pause, interval, keep, crop, status, quit)")]
    UnknownCommand(String),
    /// Command needs an argument that was not given.
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    /// Argument failed validation.
    #[error("invalid argument for `{command}`: {reason}")]
    InvalidArgument {
        /// Command being parsed.
        command: &'static str,
        /// Validation message.
        reason: String,
    },
}

/// Parses one console line.
///
/// # Errors
/// Returns [`ConsoleError`] for unknown commands and bad arguments.
pub fn parse_line(line: &str) -> Result<ConsoleInput, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(ConsoleInput::Blank);
    };
    let rest: Vec<&str> = words.collect();

    let command = match head.to_ascii_lowercase().as_str() {
        "capture" => Command::CaptureNow,
        "pause" | "resume" => Command::TogglePause,
        "interval" => {
            let raw = rest.first().ok_or(ConsoleError::MissingArgument("interval"))?;
            let secs = raw.parse::<u64>().map_err(|error| invalid("interval", error))?;
            let interval =
                CaptureInterval::from_secs(secs).map_err(|error| invalid("interval", error))?;
            Command::SetInterval(interval)
        }
        "keep" => {
            let raw = rest.first().ok_or(ConsoleError::MissingArgument("keep"))?;
            let count = raw.parse::<usize>().map_err(|error| invalid("keep", error))?;
            let count = RetentionCount::new(count).map_err(|error| invalid("keep", error))?;
            Command::SetRetention(count)
        }
        "crop" => match rest.as_slice() {
            [] => return Err(ConsoleError::MissingArgument("crop")),
            [word] if word.eq_ignore_ascii_case("none") => Command::SetCropRegion(None),
            values => {
                let region = values
                    .join(" ")
                    .parse::<CropRegion>()
                    .map_err(|error| invalid("crop", error))?;
                Command::SetCropRegion(Some(region))
            }
        },
        "status" => return Ok(ConsoleInput::Status),
        "quit" | "exit" => Command::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };

    Ok(ConsoleInput::Command(command))
}

fn invalid(command: &'static str, error: impl ToString) -> ConsoleError {
    ConsoleError::InvalidArgument {
        command,
        reason: error.to_string(),
    }
}

/// Feeds console lines to `agent` until `quit` or end of input.
///
/// Replies and parse errors go to `output`.
pub fn run_console<R, W>(input: R, mut output: W, agent: &Agent) -> ConsoleExit
where
    R: BufRead,
    W: Write,
{
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, "console read failed");
                break;
            }
        };

        let reply = match parse_line(&line) {
            Ok(ConsoleInput::Blank) => continue,
            Ok(ConsoleInput::Status) => match agent.status() {
                Ok(status) => status.to_string(),
                Err(error) => format!("status unavailable: {error}"),
            },
            Ok(ConsoleInput::Command(Command::Quit)) => return ConsoleExit::Quit,
            Ok(ConsoleInput::Command(command)) => match agent.send(command) {
                Ok(()) => "ok".to_string(),
                Err(error) => format!("command failed: {error}"),
            },
            Err(error) => error.to_string(),
        };

        if writeln!(output, "{reply}").is_err() {
            break;
        }
    }
    ConsoleExit::Closed
}
