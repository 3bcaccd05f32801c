#![warn(missing_docs)]
//! # sentinel-events
//!
//! ## Purpose
//! Bounded, in-memory activity log served to viewers as ordered JSON.
//!
//! ## Responsibilities
//! - Stamp appended events with a unique id and the current time.
//! - Keep at most `M` events, newest first, evicting the oldest on overflow.
//! - Clear the whole log on request.
//!
//! ## Data flow
//! Producers (system observers, the agent's control loop) -> [`EventSink`] ->
//! [`EventLog`] -> HTTP `/notifications` via [`EventLog::snapshot`].
//!
//! ## Ownership and lifetimes
//! The log owns its ring behind a mutex and hands out cloned snapshots, so no
//! reader holds the lock while serializing or writing to a socket.
//!
//! ## Error model
//! Appends and clears cannot fail. A poisoned lock is recovered because every
//! mutation leaves the ring consistent.
//!
//! ## Security and privacy notes
//! Event bodies may carry user content (clipboard previews); they are
//! truncated to [`MAX_BODY_CHARS`] and never written to the process log.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sentinel_core::serialize_rfc3339;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Default number of events kept.
pub const DEFAULT_EVENT_CAPACITY: usize = 50;

/// Longest body kept verbatim; longer bodies are cut and suffixed with `...`.
pub const MAX_BODY_CHARS: usize = 100;

/// Category of an activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Clipboard content changed.
    Clipboard,
    /// An application was launched.
    AppLaunch,
    /// An application quit.
    AppQuit,
    /// Host or agent lifecycle (sleep/wake, monitoring state).
    System,
    /// Screen lock/unlock and similar.
    Security,
}

impl EventKind {
    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Clipboard => "clipboard",
            EventKind::AppLaunch => "app_launch",
            EventKind::AppQuit => "app_quit",
            EventKind::System => "system",
            EventKind::Security => "security",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Time the event was appended.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Event category.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Short headline.
    pub title: String,
    /// Free text, possibly truncated.
    pub body: String,
}

/// Anything that accepts activity events.
pub trait EventSink: Send + Sync {
    /// Records one event.
    fn record(&self, kind: EventKind, title: &str, body: &str);
}

/// Fixed-capacity, newest-first event ring.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
}

impl EventLog {
    /// Creates an empty log holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends one event at the head, evicting the oldest beyond capacity.
    ///
    /// Returns a copy of the stored event.
    pub fn append(&self, kind: EventKind, title: impl Into<String>, body: &str) -> Event {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            kind,
            title: title.into(),
            body: truncate_body(body),
        };

        let mut events = self.events();
        events.push_front(event.clone());
        events.truncate(self.capacity);
        event
    }

    /// Removes every event.
    pub fn clear(&self) {
        self.events().clear();
    }

    /// Returns the current events, newest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events().iter().cloned().collect()
    }

    /// Returns the number of stored events.
    pub fn len(&self) -> usize {
        self.events().len()
    }

    /// Returns `true` when no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    /// Serializes the current events as a JSON array, newest first.
    ///
    /// # Errors
    /// Returns the serializer error when a timestamp cannot be formatted.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for EventLog {
    fn record(&self, kind: EventKind, title: &str, body: &str) {
        self.append(kind, title, body);
    }
}

/// Cuts `body` to [`MAX_BODY_CHARS`] characters, marking the cut with `...`.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for body truncation and kind names.

    use super::*;

    #[test]
    fn short_bodies_are_untouched() {
        let body = "x".repeat(MAX_BODY_CHARS);
        assert_eq!(truncate_body(&body), body);
    }

    #[test]
    fn long_bodies_are_cut_on_char_boundaries() {
        let body = "é".repeat(MAX_BODY_CHARS + 5);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), MAX_BODY_CHARS + 3);
    }

    #[test]
    fn kind_names_match_wire_names() {
        for kind in [
            EventKind::Clipboard,
            EventKind::AppLaunch,
            EventKind::AppQuit,
            EventKind::System,
            EventKind::Security,
        ] {
            let wire = serde_json::to_string(&kind).unwrap();
            assert_eq!(wire, format!("\"{kind}\""));
        }
    }
}
