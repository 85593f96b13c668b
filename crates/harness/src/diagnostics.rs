//! The diagnostic event log shared between the browser event callback and the
//! engine's polling loops

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Console,
    PageError,
}

/// One message observed on the page's diagnostic stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticEvent {
    /// Position in the log
    pub seq: usize,
    pub source: EventSource,
    /// Console level (`log`, `warning`, `error`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub text: String,
    /// Milliseconds since the log was created
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Trimmed message text equals the marker
    #[default]
    Exact,
    /// Message text contains the marker
    Contains,
}

/// A diagnostic marker and how console text is matched against it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: String,
    pub mode: MatchMode,
}

impl Marker {
    pub fn new(name: impl Into<String>, mode: MatchMode) -> Self {
        Self { name: name.into(), mode }
    }

    pub fn exact(name: impl Into<String>) -> Self {
        Self::new(name, MatchMode::Exact)
    }

    pub fn matches(&self, text: &str) -> bool {
        match self.mode {
            MatchMode::Exact => text.trim() == self.name,
            MatchMode::Contains => text.contains(&self.name),
        }
    }

    fn matches_event(&self, event: &DiagnosticEvent) -> bool {
        event.source == EventSource::Console && self.matches(&event.text)
    }
}

#[derive(Debug)]
struct LogInner {
    started: Instant,
    events: Vec<DiagnosticEvent>,
}

/// Append-only, ordered, thread-safe event log.
///
/// Clones share the same underlying log. Readers only ever see snapshots or
/// counts, never a live reference.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<LogInner>>,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                started: Instant::now(),
                events: Vec::new(),
            })),
        }
    }

    pub fn append(&self, source: EventSource, level: Option<String>, text: impl Into<String>) {
        let mut inner = self.inner.lock();
        let event = DiagnosticEvent {
            seq: inner.events.len(),
            source,
            level,
            text: text.into(),
            at_ms: inner.started.elapsed().as_millis() as u64,
        };
        inner.events.push(event);
    }

    pub fn console(&self, text: impl Into<String>) {
        self.append(EventSource::Console, Some("log".to_string()), text);
    }

    pub fn page_error(&self, text: impl Into<String>) {
        self.append(EventSource::PageError, None, text);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<DiagnosticEvent> {
        self.inner.lock().events.clone()
    }

    /// Occurrences of `marker` over the whole log
    pub fn count(&self, marker: &Marker) -> usize {
        self.count_since(marker, 0)
    }

    /// Occurrences of `marker` at or after log position `offset`
    pub fn count_since(&self, marker: &Marker, offset: usize) -> usize {
        let inner = self.inner.lock();
        inner
            .events
            .iter()
            .skip(offset)
            .filter(|event| marker.matches_event(event))
            .count()
    }

    /// Log length and occurrences of `marker` taken under one lock, so no
    /// event lands between the two
    pub fn checkpoint(&self, marker: Option<&Marker>) -> (usize, usize) {
        let inner = self.inner.lock();
        let count = marker
            .map(|m| inner.events.iter().filter(|event| m.matches_event(event)).count())
            .unwrap_or(0);
        (inner.events.len(), count)
    }

    /// Plain text of every event, in order
    pub fn texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .events
            .iter()
            .map(|event| match event.source {
                EventSource::Console => event.text.clone(),
                EventSource::PageError => format!("[pageerror] {}", event.text),
            })
            .collect()
    }

    pub fn page_errors(&self) -> Vec<String> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|event| event.source == EventSource::PageError)
            .map(|event| event.text.clone())
            .collect()
    }
}
