//! Reorder protocol for stage positions.

use std::collections::{HashMap, HashSet};
use tracing::info;

use super::EndorsementPipeline;
use crate::context::ActingIdentity;
use crate::core::{Stage, StagePosition};
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{event_types, AuditFact};

/// Validates a reorder request against the current registry.
///
/// The request is overlaid on the stages it does not mention; the result
/// must give every stage a distinct, non-negative position. Returns the
/// entries that actually change a position.
pub fn plan_reorder(
    current: &[Stage],
    requested: &[StagePosition],
) -> PipelineResult<Vec<StagePosition>> {
    if requested.is_empty() {
        return Err(PipelineError::invalid_field(
            "positions",
            "Reorder request must list at least one stage",
        ));
    }

    let mut seen = HashSet::new();
    for entry in requested {
        if !seen.insert(entry.id) {
            return Err(PipelineError::invalid_field(
                "positions",
                format!("Stage {} is listed more than once", entry.id),
            ));
        }
        if entry.position < 0 {
            return Err(PipelineError::invalid_field(
                "positions",
                format!("Position {} for stage {} is negative", entry.position, entry.id),
            ));
        }
    }

    let by_id: HashMap<_, _> = current.iter().map(|s| (s.id, s)).collect();
    if let Some(missing) = requested.iter().find(|e| !by_id.contains_key(&e.id)) {
        return Err(PipelineError::stage_not_found(missing.id));
    }

    let overrides: HashMap<_, _> = requested.iter().map(|e| (e.id, e.position)).collect();
    let mut occupied: HashMap<i32, &Stage> = HashMap::new();
    for stage in current {
        let position = overrides.get(&stage.id).copied().unwrap_or(stage.position);
        if let Some(other) = occupied.insert(position, stage) {
            return Err(PipelineError::invalid_field(
                "positions",
                format!(
                    "Stages '{}' and '{}' would share position {position}",
                    other.name, stage.name
                ),
            ));
        }
    }

    Ok(requested
        .iter()
        .filter(|e| by_id.get(&e.id).is_some_and(|s| s.position != e.position))
        .copied()
        .collect())
}

impl EndorsementPipeline {
    /// Rewrites stage positions in one transaction.
    ///
    /// Callers must submit every stage whose position changes in a single
    /// call; a partial set that leaves two stages on one position fails.
    pub async fn reorder_stages(
        &self,
        positions: &[StagePosition],
        actor: &ActingIdentity,
    ) -> PipelineResult<Vec<Stage>> {
        let mut tx = self.begin().await?;
        tx.lock_registry().await?;
        let current = tx.list_stages().await?;
        let changes = plan_reorder(&current, positions)?;

        if changes.is_empty() {
            tx.rollback().await?;
            return Ok(current);
        }

        tx.set_stage_positions(changes.clone()).await?;
        tx.commit().await?;

        info!(changed = changes.len(), "Stages reordered");
        self.audit(
            &AuditFact::new(event_types::STAGE_REORDERED, actor, None, self.clock.now())
                .with_details(serde_json::json!({ "positions": changes })),
        );
        self.list_stages().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConfiguredOutcome, DEFAULT_STAGE_COLOR};
    use crate::errors::ErrorKind;
    use uuid::Uuid;

    fn stage(name: &str, position: i32) -> Stage {
        Stage {
            id: Uuid::new_v4(),
            name: name.to_string(),
            position,
            is_terminal: false,
            configured_outcome: ConfiguredOutcome::None,
            color: DEFAULT_STAGE_COLOR.to_string(),
        }
    }

    #[test]
    fn test_plan_swap() {
        let a = stage("A", 0);
        let b = stage("B", 1);
        let current = vec![a.clone(), b.clone()];

        let plan = plan_reorder(
            &current,
            &[StagePosition::new(a.id, 1), StagePosition::new(b.id, 0)],
        )
        .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_plan_partial_swap_collides() {
        let a = stage("A", 0);
        let b = stage("B", 1);
        let current = vec![a.clone(), b];

        let err = plan_reorder(&current, &[StagePosition::new(a.id, 1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("share position 1"));
    }

    #[test]
    fn test_plan_skips_unchanged() {
        let a = stage("A", 0);
        let b = stage("B", 1);
        let current = vec![a.clone(), b.clone()];

        let plan = plan_reorder(
            &current,
            &[StagePosition::new(a.id, 0), StagePosition::new(b.id, 5)],
        )
        .unwrap();
        assert_eq!(plan, vec![StagePosition::new(b.id, 5)]);
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        let a = stage("A", 0);
        let current = vec![a.clone()];

        assert_eq!(
            plan_reorder(&current, &[]).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            plan_reorder(&current, &[StagePosition::new(a.id, -1)])
                .unwrap_err()
                .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            plan_reorder(
                &current,
                &[StagePosition::new(a.id, 2), StagePosition::new(a.id, 3)]
            )
            .unwrap_err()
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            plan_reorder(&current, &[StagePosition::new(Uuid::new_v4(), 4)])
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_plan_rotation() {
        let a = stage("A", 0);
        let b = stage("B", 1);
        let c = stage("C", 2);
        let current = vec![a.clone(), b.clone(), c.clone()];

        let plan = plan_reorder(
            &current,
            &[
                StagePosition::new(a.id, 2),
                StagePosition::new(b.id, 0),
                StagePosition::new(c.id, 1),
            ],
        )
        .unwrap();
        assert_eq!(plan.len(), 3);
    }
}
