//! Pipeline stage records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConfiguredOutcome;

/// Color assigned to stages created without one.
pub const DEFAULT_STAGE_COLOR: &str = "#6b7280";

/// A named step in the endorsement pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage identifier.
    pub id: Uuid,
    /// Unique display label.
    pub name: String,
    /// Sequence position, unique across all stages.
    pub position: i32,
    /// Whether entering this stage finalizes an endorsement.
    pub is_terminal: bool,
    /// Outcome applied when an endorsement enters this stage.
    pub configured_outcome: ConfiguredOutcome,
    /// Display color.
    pub color: String,
}

impl Stage {
    /// Returns true if the terminal flag and configured outcome agree.
    #[must_use]
    pub const fn outcome_is_consistent(&self) -> bool {
        self.is_terminal || !self.configured_outcome.is_set()
    }
}

/// Input for creating a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStage {
    /// Display label.
    pub name: String,
    /// Terminal flag.
    #[serde(default)]
    pub is_terminal: bool,
    /// Configured outcome.
    #[serde(default)]
    pub configured_outcome: ConfiguredOutcome,
    /// Display color, defaults to [`DEFAULT_STAGE_COLOR`].
    #[serde(default)]
    pub color: Option<String>,
}

impl NewStage {
    /// Creates input for a non-terminal stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_terminal: false,
            configured_outcome: ConfiguredOutcome::None,
            color: None,
        }
    }

    /// Creates input for a terminal stage with the given outcome.
    #[must_use]
    pub fn terminal(name: impl Into<String>, outcome: ConfiguredOutcome) -> Self {
        Self {
            name: name.into(),
            is_terminal: true,
            configured_outcome: outcome,
            color: None,
        }
    }

    /// Sets the terminal flag.
    #[must_use]
    pub const fn with_terminal(mut self, is_terminal: bool) -> Self {
        self.is_terminal = is_terminal;
        self
    }

    /// Sets the configured outcome.
    #[must_use]
    pub const fn with_outcome(mut self, outcome: ConfiguredOutcome) -> Self {
        self.configured_outcome = outcome;
        self
    }

    /// Sets the color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Partial update of a stage. Position changes go through reordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePatch {
    /// New display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New terminal flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_terminal: Option<bool>,
    /// New configured outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_outcome: Option<ConfiguredOutcome>,
    /// New color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl StagePatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the terminal flag.
    #[must_use]
    pub const fn with_terminal(mut self, is_terminal: bool) -> Self {
        self.is_terminal = Some(is_terminal);
        self
    }

    /// Sets the configured outcome.
    #[must_use]
    pub const fn with_outcome(mut self, outcome: ConfiguredOutcome) -> Self {
        self.configured_outcome = Some(outcome);
        self
    }

    /// Sets the color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.is_terminal.is_none()
            && self.configured_outcome.is_none()
            && self.color.is_none()
    }

    /// Applies the patch to a copy of `stage`.
    #[must_use]
    pub fn apply_to(&self, stage: &Stage) -> Stage {
        let mut updated = stage.clone();
        if let Some(ref name) = self.name {
            updated.name.clone_from(name);
        }
        if let Some(is_terminal) = self.is_terminal {
            updated.is_terminal = is_terminal;
        }
        if let Some(outcome) = self.configured_outcome {
            updated.configured_outcome = outcome;
        }
        if let Some(ref color) = self.color {
            updated.color = color.clone();
        }
        updated
    }
}

/// A stage together with how many endorsements currently sit at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageWithCount {
    /// The stage.
    #[serde(flatten)]
    pub stage: Stage,
    /// Endorsements whose current stage is this one.
    pub endorsement_count: usize,
}

/// One entry of a reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePosition {
    /// Stage identifier.
    pub id: Uuid,
    /// New sequence position.
    pub position: i32,
}

impl StagePosition {
    /// Creates a reorder entry.
    #[must_use]
    pub const fn new(id: Uuid, position: i32) -> Self {
        Self { id, position }
    }
}
