//! Audit sinks: the trait and the built-in implementations.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, Level};

/// Receiver of audit facts.
///
/// The pipeline calls [`EventSink::try_emit`] after a transaction has
/// committed. Persisting or fanning out the fact is up to the sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers a fact, waiting for the sink if it needs to.
    ///
    /// `event_type` is one of [`event_types`](super::event_types); `data` is
    /// the serialized [`AuditFact`](super::AuditFact).
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Delivers a fact without waiting.
    ///
    /// Must not block. Delivery problems are the sink's to log and swallow.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// Discards every fact. The fallback when nothing is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// Writes each fact as one structured `tracing` record on the
/// `endorseflow::audit` target.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs at `level`; anything other than `DEBUG` logs at `INFO`.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at `DEBUG`.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn record(&self, event_type: &str, data: Option<&serde_json::Value>) {
        let field = |key: &str| {
            data.and_then(|d| d.get(key))
                .map(ToString::to_string)
                .unwrap_or_default()
        };
        let subject_id = field("subjectId");
        let actor_id = data
            .and_then(|d| d.pointer("/actor/userId"))
            .map(ToString::to_string)
            .unwrap_or_default();
        let details = field("details");

        if self.level == Level::DEBUG {
            debug!(target: "endorseflow::audit", event_type, subject_id, actor_id, details, "Audit fact");
        } else {
            info!(target: "endorseflow::audit", event_type, subject_id, actor_id, details, "Audit fact");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.record(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.record(event_type, data.as_ref());
    }
}

/// Keeps every fact in memory, in emission order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    facts: Mutex<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything collected so far.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.facts.lock().clone()
    }

    /// Number of facts collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.lock().is_empty()
    }

    /// Forgets everything collected.
    pub fn clear(&self) {
        self.facts.lock().clear();
    }

    /// Facts whose type starts with `type_prefix`, e.g. `"stage."`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<serde_json::Value>)> {
        self.facts
            .lock()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// The `details` payloads of facts of exactly `event_type`.
    #[must_use]
    pub fn details_of(&self, event_type: &str) -> Vec<serde_json::Value> {
        self.facts
            .lock()
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, data)| data.as_ref()?.get("details").cloned())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.try_emit(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.facts.lock().push((event_type.to_string(), data));
    }
}
