//! Stage history ledger reads and whole-store invariant audits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::records::load_endorsement;
use super::EndorsementPipeline;
use crate::core::{Decision, Endorsement, EndorsementFilter, Stage, StageHistoryEntry};
use crate::errors::PipelineResult;

/// One broken invariant found by [`EndorsementPipeline::verify_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvariantViolation {
    /// The stage or endorsement at fault, if the violation is about one.
    pub subject_id: Option<Uuid>,
    /// What is wrong.
    pub message: String,
}

impl InvariantViolation {
    fn new(subject_id: Option<Uuid>, message: impl Into<String>) -> Self {
        Self {
            subject_id,
            message: message.into(),
        }
    }
}

/// Checks one endorsement's history against its record.
///
/// `entries` must be sorted by entry time. Returns a message per problem:
/// the number of open entries, the open entry's stage, and timestamp order.
#[must_use]
pub fn check_endorsement_history(
    endorsement: &Endorsement,
    entries: &[StageHistoryEntry],
) -> Vec<String> {
    let mut problems = Vec::new();

    let open: Vec<_> = entries.iter().filter(|e| e.is_open()).collect();
    match open.as_slice() {
        [entry] => {
            if entry.stage_id != endorsement.current_stage_id {
                problems.push(format!(
                    "open history entry is at stage {} but current stage is {}",
                    entry.stage_id, endorsement.current_stage_id
                ));
            }
        }
        [] => problems.push("no open history entry".to_string()),
        many => problems.push(format!("{} open history entries", many.len())),
    }

    for entry in entries {
        if let Some(exited_at) = entry.exited_at {
            if exited_at < entry.entered_at {
                problems.push(format!("entry {} exits before it enters", entry.id));
            }
        }
    }
    for pair in entries.windows(2) {
        if pair[1].entered_at < pair[0].entered_at {
            problems.push(format!(
                "entry {} enters before its predecessor {}",
                pair[1].id, pair[0].id
            ));
        }
        if let Some(exited_at) = pair[0].exited_at {
            if exited_at > pair[1].entered_at {
                problems.push(format!(
                    "entry {} exits after its successor {} enters",
                    pair[0].id, pair[1].id
                ));
            }
        }
    }

    problems
}

fn check_stages(stages: &[Stage], violations: &mut Vec<InvariantViolation>) {
    let mut positions: HashMap<i32, &Stage> = HashMap::new();
    for stage in stages {
        if let Some(other) = positions.insert(stage.position, stage) {
            violations.push(InvariantViolation::new(
                Some(stage.id),
                format!(
                    "stages '{}' and '{}' share position {}",
                    other.name, stage.name, stage.position
                ),
            ));
        }
        if !stage.outcome_is_consistent() {
            violations.push(InvariantViolation::new(
                Some(stage.id),
                format!("non-terminal stage '{}' carries an outcome", stage.name),
            ));
        }
    }
}

impl EndorsementPipeline {
    /// History of one endorsement, oldest first.
    pub async fn get_history(&self, endorsement_id: Uuid) -> PipelineResult<Vec<StageHistoryEntry>> {
        let mut tx = self.begin().await?;
        load_endorsement(tx.as_mut(), endorsement_id).await?;
        let history = tx.history(endorsement_id).await?;
        tx.rollback().await?;
        Ok(history)
    }

    /// Audits committed state and returns every violation found.
    ///
    /// A locked endorsement may stay `pending`: it entered a terminal stage
    /// whose outcome did not resolve at the time. It must still sit on a
    /// terminal stage.
    pub async fn verify_invariants(&self) -> PipelineResult<Vec<InvariantViolation>> {
        let mut tx = self.begin().await?;
        let stages = tx.list_stages().await?;
        let mut violations = Vec::new();
        check_stages(&stages, &mut violations);

        let by_id: HashMap<_, _> = stages.iter().map(|s| (s.id, s)).collect();
        let (endorsements, _) = tx
            .list_endorsements(&EndorsementFilter::new(), 0, usize::MAX)
            .await?;

        for endorsement in &endorsements {
            let subject = Some(endorsement.id);
            let Some(stage) = by_id.get(&endorsement.current_stage_id) else {
                violations.push(InvariantViolation::new(
                    subject,
                    format!("current stage {} does not exist", endorsement.current_stage_id),
                ));
                continue;
            };

            if !endorsement.is_locked() && endorsement.decision != Decision::Pending {
                violations.push(InvariantViolation::new(
                    subject,
                    format!("unlocked endorsement has final decision {}", endorsement.decision),
                ));
            }
            if endorsement.is_locked() && !stage.is_terminal {
                violations.push(InvariantViolation::new(
                    subject,
                    format!("locked endorsement sits on non-terminal stage '{}'", stage.name),
                ));
            }

            let history = tx.history(endorsement.id).await?;
            violations.extend(
                check_endorsement_history(endorsement, &history)
                    .into_iter()
                    .map(|message| InvariantViolation::new(subject, message)),
            );
        }
        tx.rollback().await?;

        if violations.is_empty() {
            debug!(
                stages = stages.len(),
                endorsements = endorsements.len(),
                "Invariant audit passed"
            );
        } else {
            warn!(count = violations.len(), "Invariant audit found violations");
        }
        Ok(violations)
    }
}
