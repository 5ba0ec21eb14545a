//! Endorsement records and their query types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Decision, Stage};
use crate::utils::Timestamp;

/// One candidate's or measure's journey through the pipeline for one race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endorsement {
    /// Endorsement identifier.
    pub id: Uuid,
    /// Candidate (or ballot measure) reference.
    pub candidate_id: Uuid,
    /// Race reference.
    pub race_id: Uuid,
    /// The stage the endorsement currently occupies.
    pub current_stage_id: Uuid,
    /// Decision outcome.
    pub decision: Decision,
    /// Set once the endorsement entered a terminal stage.
    pub locked_at: Option<Timestamp>,
    /// Assigned reviewer.
    pub assigned_to_id: Option<Uuid>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Endorsement from a prior cycle this one re-runs.
    pub previous_endorsement_id: Option<Uuid>,
}

impl Endorsement {
    /// Returns true once the decision is final.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }
}

/// Input for creating an endorsement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEndorsement {
    /// Candidate reference.
    pub candidate_id: Uuid,
    /// Race reference.
    pub race_id: Uuid,
    /// Stage the endorsement starts at.
    pub initial_stage_id: Uuid,
    /// Assigned reviewer.
    #[serde(default)]
    pub assigned_to_id: Option<Uuid>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Prior endorsement this one re-runs.
    #[serde(default)]
    pub previous_endorsement_id: Option<Uuid>,
}

impl NewEndorsement {
    /// Creates endorsement input with no assignee or notes.
    #[must_use]
    pub const fn new(candidate_id: Uuid, race_id: Uuid, initial_stage_id: Uuid) -> Self {
        Self {
            candidate_id,
            race_id,
            initial_stage_id,
            assigned_to_id: None,
            notes: None,
            previous_endorsement_id: None,
        }
    }

    /// Sets the assignee.
    #[must_use]
    pub const fn with_assignee(mut self, user_id: Uuid) -> Self {
        self.assigned_to_id = Some(user_id);
        self
    }

    /// Sets the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Links a prior endorsement.
    #[must_use]
    pub const fn with_previous(mut self, endorsement_id: Uuid) -> Self {
        self.previous_endorsement_id = Some(endorsement_id);
        self
    }
}

/// Edit of non-decision endorsement fields.
///
/// The outer `Option` means "leave unchanged"; `Some(None)` clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    /// New assignee.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub assigned_to_id: Option<Option<Uuid>>,
    /// New notes.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub notes: Option<Option<String>>,
}

/// A field that is present deserializes to `Some`, even when it is `null`.
/// Absent fields fall back to `default`.
fn present_or_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl MetadataPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the assignee.
    #[must_use]
    pub const fn with_assignee(mut self, user_id: Option<Uuid>) -> Self {
        self.assigned_to_id = Some(user_id);
        self
    }

    /// Sets or clears the notes.
    #[must_use]
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = Some(notes);
        self
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.assigned_to_id.is_none() && self.notes.is_none()
    }
}

/// Filters for listing endorsements. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementFilter {
    /// Only endorsements currently at this stage.
    #[serde(default)]
    pub stage_id: Option<Uuid>,
    /// Only endorsements with this decision.
    #[serde(default)]
    pub decision: Option<Decision>,
    /// Only endorsements assigned to this reviewer.
    #[serde(default)]
    pub assigned_to_id: Option<Uuid>,
}

impl EndorsementFilter {
    /// Creates a filter matching everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to a stage.
    #[must_use]
    pub const fn at_stage(mut self, stage_id: Uuid) -> Self {
        self.stage_id = Some(stage_id);
        self
    }

    /// Restricts to a decision.
    #[must_use]
    pub const fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Restricts to an assignee.
    #[must_use]
    pub const fn assigned_to(mut self, user_id: Uuid) -> Self {
        self.assigned_to_id = Some(user_id);
        self
    }

    /// Returns true if the endorsement passes the filter.
    #[must_use]
    pub fn matches(&self, endorsement: &Endorsement) -> bool {
        self.stage_id.map_or(true, |id| endorsement.current_stage_id == id)
            && self.decision.map_or(true, |d| endorsement.decision == d)
            && self
                .assigned_to_id
                .map_or(true, |id| endorsement.assigned_to_id == Some(id))
    }
}

/// Page selection. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// 1-based page number.
    pub page: usize,
    /// Page size; `None` uses the configured default.
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
        }
    }
}

impl PageRequest {
    /// Creates a page request.
    #[must_use]
    pub const fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size: Some(page_size),
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: usize,
    /// Page size used.
    pub page_size: usize,
    /// Total matching items across all pages.
    pub total: usize,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` items.
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total.div_ceil(self.page_size)
        }
    }

    /// Returns true if a later page exists.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// An endorsement with its current stage populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementDetail {
    /// The endorsement.
    #[serde(flatten)]
    pub endorsement: Endorsement,
    /// Its current stage.
    pub current_stage: Stage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endorsement_at(stage_id: Uuid) -> Endorsement {
        Endorsement {
            id: Uuid::new_v4(),
            candidate_id: Uuid::new_v4(),
            race_id: Uuid::new_v4(),
            current_stage_id: stage_id,
            decision: Decision::Pending,
            locked_at: None,
            assigned_to_id: None,
            notes: None,
            previous_endorsement_id: None,
        }
    }

    #[test]
    fn test_filter_matches() {
        let stage_id = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let mut endorsement = endorsement_at(stage_id);
        endorsement.assigned_to_id = Some(reviewer);

        assert!(EndorsementFilter::new().matches(&endorsement));
        assert!(EndorsementFilter::new().at_stage(stage_id).matches(&endorsement));
        assert!(!EndorsementFilter::new()
            .at_stage(Uuid::new_v4())
            .matches(&endorsement));
        assert!(EndorsementFilter::new()
            .with_decision(Decision::Pending)
            .assigned_to(reviewer)
            .matches(&endorsement));
        assert!(!EndorsementFilter::new()
            .with_decision(Decision::Endorsed)
            .matches(&endorsement));
    }

    #[test]
    fn test_page_math() {
        let page: Page<u8> = Page {
            items: vec![],
            page: 1,
            page_size: 10,
            total: 21,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
    }

    #[test]
    fn test_endorsement_serialized_shape() {
        let endorsement = endorsement_at(Uuid::new_v4());
        let value = serde_json::to_value(&endorsement).unwrap();

        assert_eq!(value["decision"], "pending");
        assert!(value["lockedAt"].is_null());
        assert!(value.get("currentStageId").is_some());
        assert!(value.get("previousEndorsementId").is_some());
    }

    #[test]
    fn test_metadata_patch_empty() {
        assert!(MetadataPatch::new().is_empty());
        assert!(!MetadataPatch::new().with_notes(None).is_empty());
    }

    #[test]
    fn test_metadata_patch_null_clears() {
        let patch: MetadataPatch =
            serde_json::from_str(r#"{"notes":null,"assignedToId":null}"#).unwrap();
        assert!(!patch.is_empty());
        assert_eq!(patch, MetadataPatch::new().with_notes(None).with_assignee(None));

        let absent: MetadataPatch = serde_json::from_str("{}").unwrap();
        assert!(absent.is_empty());

        let reviewer = Uuid::new_v4();
        let set: MetadataPatch =
            serde_json::from_str(&format!(r#"{{"assignedToId":"{reviewer}"}}"#)).unwrap();
        assert_eq!(set.assigned_to_id, Some(Some(reviewer)));
        assert_eq!(set.notes, None);
    }

    #[test]
    fn test_metadata_patch_clear_survives_serialization() {
        let patch = MetadataPatch::new().with_notes(None);
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"notes":null}"#);
        let back: MetadataPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, patch);
    }
}
