// src/events.rs

//! Observability port.
//!
//! Components do not log run lifecycle events through a global; they are
//! handed an [`EventSink`] and record structured [`Event`]s into it.
//!
//! - [`TracingEventSink`] forwards events to `tracing` (production).
//! - [`RecordingEventSink`] keeps them in memory so tests can assert on the
//!   exact sequence.

use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured event: a stable name plus key/value fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: &'static str,
    pub severity: Severity,
    pub fields: Vec<(&'static str, String)>,
}

impl Event {
    pub fn new(severity: Severity, name: &'static str) -> Self {
        Self {
            name,
            severity,
            fields: Vec::new(),
        }
    }

    pub fn debug(name: &'static str) -> Self {
        Self::new(Severity::Debug, name)
    }

    pub fn info(name: &'static str) -> Self {
        Self::new(Severity::Info, name)
    }

    pub fn warn(name: &'static str) -> Self {
        Self::new(Severity::Warn, name)
    }

    pub fn error(name: &'static str) -> Self {
        Self::new(Severity::Error, name)
    }

    pub fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for (k, v) in &self.fields {
            write!(f, " {k}={v}")?;
        }
        Ok(())
    }
}

/// Capability for recording events.
pub trait EventSink: Send + Sync + Debug {
    fn record(&self, event: Event);
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn EventSink>;

/// Forwards events to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: Event) {
        let fields = event
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");

        match event.severity {
            Severity::Debug => debug!(event = event.name, "{fields}"),
            Severity::Info => info!(event = event.name, "{fields}"),
            Severity::Warn => warn!(event = event.name, "{fields}"),
            Severity::Error => error!(event = event.name, "{fields}"),
        }
    }
}

/// Keeps every event in memory, in recording order.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name).collect()
    }

    /// Events with the given name, optionally restricted to one task.
    pub fn matching(&self, name: &str, task: Option<&str>) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name && task.is_none_or(|t| e.field("task") == Some(t)))
            .collect()
    }

    /// Position of the first event with this name for this task.
    pub fn position(&self, name: &str, task: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| e.name == name && e.field("task") == Some(task))
    }

    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name == name).count()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
