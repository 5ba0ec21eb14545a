//! Error types for the endorsement pipeline.
//!
//! Every failure carries a human-readable message and a machine-checkable
//! [`ErrorKind`]. Presentation is left to the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::Timestamp;

/// Convenience alias used throughout the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Machine-checkable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input.
    Validation,
    /// Referenced entity absent.
    NotFound,
    /// Operation would violate a structural invariant.
    Conflict,
    /// Mutation attempted on a finalized endorsement.
    Locked,
    /// Lost a race with a concurrent writer; safe to retry.
    ConcurrentModification,
    /// The backing store failed.
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Locked => write!(f, "locked"),
            Self::ConcurrentModification => write!(f, "concurrent_modification"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// The entity a [`PipelineError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A pipeline stage.
    Stage,
    /// An endorsement.
    Endorsement,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage => write!(f, "Stage"),
            Self::Endorsement => write!(f, "Endorsement"),
        }
    }
}

/// The main error type for pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Input was malformed; nothing was written.
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong.
        message: String,
        /// The offending input field, when known.
        field: Option<String>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity.
        entity: EntityKind,
        /// The identifier looked up.
        id: Uuid,
    },

    /// The operation would break a structural invariant.
    #[error("Conflict: {message}")]
    Conflict {
        /// What would be violated.
        message: String,
        /// Number of records blocking the operation, when relevant.
        blocking_count: Option<usize>,
    },

    /// The endorsement has a final decision and cannot change.
    #[error("Endorsement {endorsement_id} is locked since {locked_at}")]
    Locked {
        /// The locked endorsement.
        endorsement_id: Uuid,
        /// When it was locked.
        locked_at: Timestamp,
    },

    /// A concurrent writer got there first; the caller may retry.
    #[error("Concurrent modification: {message}")]
    ConcurrentModification {
        /// What collided.
        message: String,
    },

    /// The backing store failed.
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a validation error naming the offending field.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a stage-not-found error.
    #[must_use]
    pub const fn stage_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: EntityKind::Stage,
            id,
        }
    }

    /// Creates an endorsement-not-found error.
    #[must_use]
    pub const fn endorsement_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: EntityKind::Endorsement,
            id,
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            blocking_count: None,
        }
    }

    /// Creates a conflict error blocked by `count` records.
    #[must_use]
    pub fn blocked(message: impl Into<String>, count: usize) -> Self {
        Self::Conflict {
            message: message.into(),
            blocking_count: Some(count),
        }
    }

    /// Creates a locked error.
    #[must_use]
    pub const fn locked(endorsement_id: Uuid, locked_at: Timestamp) -> Self {
        Self::Locked {
            endorsement_id,
            locked_at,
        }
    }

    /// Creates a concurrent modification error.
    #[must_use]
    pub fn concurrent(message: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            message: message.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Locked { .. } => ErrorKind::Locked,
            Self::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentModification { .. } => true,
            Self::Store(err) => err.retryable,
            _ => false,
        }
    }

    /// Status code for request/response surfaces.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::ConcurrentModification => 409,
            ErrorKind::Locked => 403,
            ErrorKind::Store => 500,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));

        match self {
            Self::Validation { field, .. } => {
                if let Some(field) = field {
                    map.insert("field".to_string(), serde_json::json!(field));
                }
            }
            Self::NotFound { entity, id } => {
                map.insert("entity".to_string(), serde_json::json!(entity));
                map.insert("id".to_string(), serde_json::json!(id));
            }
            Self::Conflict { blocking_count, .. } => {
                if let Some(count) = blocking_count {
                    map.insert("blocking_count".to_string(), serde_json::json!(count));
                }
            }
            Self::Locked {
                endorsement_id,
                locked_at,
            } => {
                map.insert("endorsement_id".to_string(), serde_json::json!(endorsement_id));
                map.insert("locked_at".to_string(), serde_json::json!(locked_at));
            }
            Self::ConcurrentModification { .. } | Self::Store(_) => {}
        }

        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Failure reported by a store backend.
#[derive(Debug, Clone, Error)]
#[error("Store error: {message}")]
pub struct StoreError {
    /// What failed.
    pub message: String,
    /// Whether the operation may succeed if retried.
    pub retryable: bool,
}

impl StoreError {
    /// Creates a non-retryable store error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable store error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_kinds_and_status() {
        let err = PipelineError::validation("name is empty");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), 422);

        let err = PipelineError::stage_not_found(Uuid::nil());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status_code(), 404);
        assert!(err.to_string().starts_with("Stage not found"));

        let err = PipelineError::locked(Uuid::nil(), Utc::now());
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_retryable() {
        assert!(PipelineError::concurrent("row busy").is_retryable());
        assert!(!PipelineError::conflict("in use").is_retryable());
        assert!(PipelineError::from(StoreError::retryable("timeout")).is_retryable());
        assert!(!PipelineError::from(StoreError::new("disk full")).is_retryable());
    }

    #[test]
    fn test_blocked_conflict_to_dict() {
        let err = PipelineError::blocked("Stage is in use by 3 endorsements", 3);
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "conflict");
        assert_eq!(dict.get("blocking_count").unwrap(), 3);
        assert_eq!(dict.get("retryable").unwrap(), false);
        assert!(dict
            .get("message")
            .unwrap()
            .as_str()
            .unwrap()
            .contains("3 endorsements"));
    }

    #[test]
    fn test_invalid_field_to_dict() {
        let err = PipelineError::invalid_field("color", "Color must be #RRGGBB");
        let dict = err.to_dict();
        assert_eq!(dict.get("field").unwrap(), "color");
    }
}
