//! Event sink system for audit facts.
//!
//! The pipeline reports every committed change as an audit fact through an
//! [`EventSink`]. Delivery and persistence of those facts is the sink's
//! concern; emission always happens after the store has committed.

mod audit;
mod sink;

pub use audit::{event_types, AuditFact};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

#[cfg(test)]
pub use sink::MockEventSink;

use parking_lot::RwLock;
use std::sync::Arc;

// Process-wide fallback sink for pipelines built without one
static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the current global event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the current global event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the current global event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_global_sink_default() {
        clear_event_sink();
        let sink = get_event_sink();
        sink.try_emit(event_types::STAGE_CREATED, None);
    }

    #[tokio::test]
    async fn test_set_and_get_sink() {
        let sink: Arc<dyn EventSink> = Arc::new(LoggingEventSink::default());
        set_event_sink(sink);

        let retrieved = get_event_sink();
        retrieved.try_emit(
            event_types::ENDORSEMENT_ADVANCED,
            Some(serde_json::json!({"key": "value"})),
        );

        clear_event_sink();
    }
}
