//! Structured audit facts emitted after committed changes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EventSink;
use crate::context::ActingIdentity;
use crate::utils::Timestamp;

/// Event type names.
pub mod event_types {
    /// A stage was created.
    pub const STAGE_CREATED: &str = "stage.created";
    /// A stage was edited.
    pub const STAGE_UPDATED: &str = "stage.updated";
    /// A stage was deleted.
    pub const STAGE_DELETED: &str = "stage.deleted";
    /// Stage positions were rewritten.
    pub const STAGE_REORDERED: &str = "stage.reordered";
    /// Terminal stage outcomes were backfilled from their names.
    pub const STAGE_OUTCOMES_BACKFILLED: &str = "stage.outcomes_backfilled";
    /// An endorsement was created.
    pub const ENDORSEMENT_CREATED: &str = "endorsement.created";
    /// Endorsement metadata was edited.
    pub const ENDORSEMENT_UPDATED: &str = "endorsement.updated";
    /// An endorsement and its history were deleted.
    pub const ENDORSEMENT_DELETED: &str = "endorsement.deleted";
    /// An endorsement moved to a new stage.
    pub const ENDORSEMENT_ADVANCED: &str = "endorsement.advanced";
}

/// One audit fact: who did what to which record, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFact {
    /// Event type, one of [`event_types`].
    pub event_type: String,
    /// Acting identity.
    pub actor: ActingIdentity,
    /// The stage or endorsement the fact is about.
    pub subject_id: Option<Uuid>,
    /// When the change committed.
    pub occurred_at: Timestamp,
    /// Event-specific details.
    pub details: serde_json::Value,
}

impl AuditFact {
    /// Creates a fact with empty details.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        actor: &ActingIdentity,
        subject_id: Option<Uuid>,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            actor: actor.clone(),
            subject_id,
            occurred_at,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Sets the details payload.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Hands the fact to a sink without blocking.
    pub fn emit_to(&self, sink: &dyn EventSink) {
        match serde_json::to_value(self) {
            Ok(data) => sink.try_emit(&self.event_type, Some(data)),
            Err(err) => {
                tracing::warn!(
                    event_type = %self.event_type,
                    error = %err,
                    "Dropping audit fact that failed to serialize"
                );
            }
        }
    }
}
