// crates/layerconf-db/src/events.rs
// ============================================================================
// Module: Store Events
// Description: Structured JSON-line events for persistence operations.
// Purpose: Emit operational logs without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Persistence code reports transactions, statements, dedup decisions and
//! cache invalidations as [`StoreEvent`] values recorded through a
//! [`StoreEventSink`]. Sinks filter by [`EventLevel`] and write one JSON
//! object per line. Statement events carry SQL text and argument counts,
//! never argument values, so encrypted payloads never reach the log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Statement-level tracing.
    Debug,
    /// Normal operations.
    #[default]
    Info,
    /// Unusual but tolerated conditions.
    Warn,
}

/// Persistence event payload.
#[derive(Debug, Clone, Serialize)]
pub struct StoreEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event severity.
    pub level: EventLevel,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Operation label of the surrounding unit of work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Table involved, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Row or argument count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl StoreEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str, level: EventLevel) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            level,
            timestamp_ms,
            operation: None,
            table: None,
            message: None,
            count: None,
        }
    }

    /// Sets the operation label.
    #[must_use]
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the count.
    #[must_use]
    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(u64::try_from(count).unwrap_or(u64::MAX));
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Sink for persistence events.
pub trait StoreEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &StoreEvent);
}

/// Event sink that logs JSON lines to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrEventSink {
    /// Minimum level written.
    min_level: EventLevel,
}

impl StderrEventSink {
    /// Creates a sink writing events at or above `min_level`.
    #[must_use]
    pub const fn new(min_level: EventLevel) -> Self {
        Self {
            min_level,
        }
    }
}

impl StoreEventSink for StderrEventSink {
    fn record(&self, event: &StoreEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Event sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
    /// Minimum level written.
    min_level: EventLevel,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path, min_level: EventLevel) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            min_level,
        })
    }
}

impl StoreEventSink for FileEventSink {
    fn record(&self, event: &StoreEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl StoreEventSink for NoopEventSink {
    fn record(&self, _event: &StoreEvent) {}
}
