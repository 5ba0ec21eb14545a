//! Stage registry operations.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::EndorsementPipeline;
use crate::context::ActingIdentity;
use crate::core::{
    ConfiguredOutcome, NewStage, Stage, StagePatch, StageWithCount, DEFAULT_STAGE_COLOR,
};
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{event_types, AuditFact};
use crate::store::StoreTransaction;
use crate::utils::validation::{validate_color, validate_stage_name};

/// Result of backfilling configured outcomes from legacy stage names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    /// Terminal stages that received an outcome.
    pub updated: Vec<Stage>,
    /// Terminal stages whose names resolve to no outcome.
    pub unresolved: Vec<Stage>,
}

fn ensure_outcome_consistent(stage: &Stage) -> PipelineResult<()> {
    if stage.outcome_is_consistent() {
        Ok(())
    } else {
        Err(PipelineError::invalid_field(
            "configuredOutcome",
            format!(
                "Only terminal stages may carry an outcome; '{}' is not terminal",
                stage.name
            ),
        ))
    }
}

fn ensure_name_available(stages: &[Stage], name: &str, except: Option<Uuid>) -> PipelineResult<()> {
    let lowered = name.to_lowercase();
    let taken = stages
        .iter()
        .any(|s| Some(s.id) != except && s.name.to_lowercase() == lowered);
    if taken {
        Err(PipelineError::conflict(format!("A stage named '{name}' already exists")))
    } else {
        Ok(())
    }
}

pub(super) async fn load_stage(tx: &mut dyn StoreTransaction, id: Uuid) -> PipelineResult<Stage> {
    tx.get_stage(id)
        .await?
        .ok_or_else(|| PipelineError::stage_not_found(id))
}

impl EndorsementPipeline {
    /// Lists every stage by ascending position.
    pub async fn list_stages(&self) -> PipelineResult<Vec<Stage>> {
        let mut tx = self.begin().await?;
        let stages = tx.list_stages().await?;
        tx.rollback().await?;
        Ok(stages)
    }

    /// Lists every stage with the number of endorsements currently at it.
    pub async fn list_stages_with_counts(&self) -> PipelineResult<Vec<StageWithCount>> {
        let mut tx = self.begin().await?;
        let stages = tx.list_stages().await?;
        let occupancy = tx.stage_occupancy().await?;
        tx.rollback().await?;

        Ok(stages
            .into_iter()
            .map(|stage| {
                let endorsement_count = occupancy.get(&stage.id).copied().unwrap_or(0);
                StageWithCount {
                    stage,
                    endorsement_count,
                }
            })
            .collect())
    }

    /// Looks up one stage.
    pub async fn get_stage(&self, id: Uuid) -> PipelineResult<Stage> {
        let mut tx = self.begin().await?;
        let stage = load_stage(tx.as_mut(), id).await;
        tx.rollback().await?;
        stage
    }

    /// The stage positioned directly after `id`, if any.
    ///
    /// Display helper only; advancement may target any stage.
    pub async fn next_stage(&self, id: Uuid) -> PipelineResult<Option<Stage>> {
        let stages = self.list_stages().await?;
        let current = stages
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PipelineError::stage_not_found(id))?;
        let position = current.position;
        Ok(stages.into_iter().find(|s| s.position > position))
    }

    /// Appends a stage after the current last position.
    pub async fn create_stage(&self, input: NewStage, actor: &ActingIdentity) -> PipelineResult<Stage> {
        let name = validate_stage_name(&input.name)?;
        let color = input
            .color
            .unwrap_or_else(|| DEFAULT_STAGE_COLOR.to_string());
        validate_color(&color)?;

        let mut stage = Stage {
            id: Uuid::now_v7(),
            name,
            position: 0,
            is_terminal: input.is_terminal,
            configured_outcome: input.configured_outcome,
            color,
        };
        ensure_outcome_consistent(&stage)?;

        let mut tx = self.begin().await?;
        tx.lock_registry().await?;
        let existing = tx.list_stages().await?;
        ensure_name_available(&existing, &stage.name, None)?;
        stage.position = match existing.iter().map(|s| s.position).max() {
            None => 0,
            Some(max) => max.checked_add(1).ok_or_else(|| {
                PipelineError::invalid_field(
                    "position",
                    "No position left after the last stage; reorder stages to lower positions first",
                )
            })?,
        };

        tx.insert_stage(stage.clone()).await?;
        tx.commit().await?;

        info!(
            stage_id = %stage.id,
            name = %stage.name,
            position = stage.position,
            is_terminal = stage.is_terminal,
            "Stage created"
        );
        self.audit(
            &AuditFact::new(event_types::STAGE_CREATED, actor, Some(stage.id), self.clock.now())
                .with_details(serde_json::json!({ "stage": stage })),
        );
        Ok(stage)
    }

    /// Edits a stage in place. Positions change only through reordering.
    pub async fn update_stage(
        &self,
        id: Uuid,
        mut patch: StagePatch,
        actor: &ActingIdentity,
    ) -> PipelineResult<Stage> {
        patch.name = patch.name.as_deref().map(validate_stage_name).transpose()?;
        if let Some(ref color) = patch.color {
            validate_color(color)?;
        }

        let mut tx = self.begin().await?;
        tx.lock_registry().await?;
        let before = load_stage(tx.as_mut(), id).await?;
        if patch.is_empty() {
            tx.rollback().await?;
            return Ok(before);
        }

        let updated = patch.apply_to(&before);
        ensure_outcome_consistent(&updated)?;
        if before.is_terminal && !updated.is_terminal {
            let occupying = tx.count_endorsements_at_stage(id).await?;
            if occupying > 0 {
                return Err(PipelineError::blocked(
                    format!(
                        "Stage '{}' cannot stop being terminal while {occupying} endorsement(s) sit at it",
                        before.name
                    ),
                    occupying,
                ));
            }
        }
        if updated.name.to_lowercase() != before.name.to_lowercase() {
            let existing = tx.list_stages().await?;
            ensure_name_available(&existing, &updated.name, Some(id))?;
        }

        tx.update_stage(updated.clone()).await?;
        tx.commit().await?;

        info!(stage_id = %id, name = %updated.name, "Stage updated");
        self.audit(
            &AuditFact::new(event_types::STAGE_UPDATED, actor, Some(id), self.clock.now())
                .with_details(serde_json::json!({ "before": before, "after": updated })),
        );
        Ok(updated)
    }

    /// Deletes a stage that no endorsement currently occupies.
    pub async fn delete_stage(&self, id: Uuid, actor: &ActingIdentity) -> PipelineResult<()> {
        let mut tx = self.begin().await?;
        tx.lock_registry().await?;
        let stage = load_stage(tx.as_mut(), id).await?;

        let blocking = tx.count_endorsements_at_stage(id).await?;
        if blocking > 0 {
            debug!(stage_id = %id, blocking, "Stage delete refused");
            return Err(PipelineError::blocked(
                format!(
                    "Stage '{}' is the current stage of {blocking} endorsement(s)",
                    stage.name
                ),
                blocking,
            ));
        }

        tx.delete_stage(id).await?;
        tx.commit().await?;

        info!(stage_id = %id, name = %stage.name, "Stage deleted");
        self.audit(
            &AuditFact::new(event_types::STAGE_DELETED, actor, Some(id), self.clock.now())
                .with_details(serde_json::json!({ "name": stage.name })),
        );
        Ok(())
    }

    /// Gives every terminal stage without an outcome the one its name implies.
    ///
    /// Meant to run once before switching to
    /// [`OutcomeResolution::ConfiguredOnly`](crate::config::OutcomeResolution).
    pub async fn backfill_configured_outcomes(
        &self,
        actor: &ActingIdentity,
    ) -> PipelineResult<BackfillReport> {
        let mut tx = self.begin().await?;
        tx.lock_registry().await?;

        let mut report = BackfillReport::default();
        for stage in tx.list_stages().await? {
            if !stage.is_terminal || stage.configured_outcome.is_set() {
                continue;
            }
            let outcome = ConfiguredOutcome::from_stage_name(&stage.name);
            if outcome.is_set() {
                let updated = Stage {
                    configured_outcome: outcome,
                    ..stage
                };
                tx.update_stage(updated.clone()).await?;
                report.updated.push(updated);
            } else {
                report.unresolved.push(stage);
            }
        }

        if report.updated.is_empty() {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }

        info!(
            updated = report.updated.len(),
            unresolved = report.unresolved.len(),
            "Configured outcomes backfilled"
        );
        if !report.updated.is_empty() {
            self.audit(
                &AuditFact::new(event_types::STAGE_OUTCOMES_BACKFILLED, actor, None, self.clock.now())
                    .with_details(serde_json::json!({
                        "updated": report.updated.iter().map(|s| s.id).collect::<Vec<_>>(),
                        "unresolved": report.unresolved.iter().map(|s| s.id).collect::<Vec<_>>(),
                    })),
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::PipelineFixture;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_stage_appends_positions() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();

        let a = fixture.pipeline.create_stage(NewStage::new("Research"), &actor).await.unwrap();
        let b = fixture.pipeline.create_stage(NewStage::new("Interview"), &actor).await.unwrap();

        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
        assert_eq!(a.color, DEFAULT_STAGE_COLOR);
        assert_eq!(fixture.sink.events_of_type("stage.created").len(), 2);
    }

    #[tokio::test]
    async fn test_create_stage_after_gap_uses_max_plus_one() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();
        let a = fixture.pipeline.create_stage(NewStage::new("A"), &actor).await.unwrap();
        fixture.pipeline.create_stage(NewStage::new("B"), &actor).await.unwrap();

        fixture
            .pipeline
            .reorder_stages(&[crate::core::StagePosition::new(a.id, 10)], &actor)
            .await
            .unwrap();

        let c = fixture.pipeline.create_stage(NewStage::new("C"), &actor).await.unwrap();
        assert_eq!(c.position, 11);
    }

    #[tokio::test]
    async fn test_create_stage_after_highest_position_is_rejected() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();
        let a = fixture.pipeline.create_stage(NewStage::new("A"), &actor).await.unwrap();

        fixture
            .pipeline
            .reorder_stages(&[crate::core::StagePosition::new(a.id, i32::MAX)], &actor)
            .await
            .unwrap();

        let err = fixture.pipeline.create_stage(NewStage::new("B"), &actor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(fixture.pipeline.list_stages().await.unwrap().len(), 1);
        assert_eq!(fixture.sink.events_of_type("stage.created").len(), 1);
    }

    #[tokio::test]
    async fn test_create_stage_validation() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();

        let err = fixture.pipeline.create_stage(NewStage::new("  "), &actor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = fixture
            .pipeline
            .create_stage(
                NewStage::new("Research").with_outcome(ConfiguredOutcome::Endorsed),
                &actor,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = fixture
            .pipeline
            .create_stage(NewStage::new("Research").with_color("blue"), &actor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert!(fixture.pipeline.list_stages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_stage_duplicate_name() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();
        fixture.pipeline.create_stage(NewStage::new("Research"), &actor).await.unwrap();

        let err = fixture
            .pipeline
            .create_stage(NewStage::new("research"), &actor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_distinct_positions() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();

        let creates = (0..8).map(|i| {
            let pipeline = fixture.pipeline.clone();
            let actor = actor.clone();
            tokio::spawn(async move {
                pipeline
                    .create_stage(NewStage::new(format!("Stage {i}")), &actor)
                    .await
            })
        });
        for handle in futures::future::join_all(creates).await {
            handle.unwrap().unwrap();
        }

        let positions: Vec<i32> = fixture
            .pipeline
            .list_stages()
            .await
            .unwrap()
            .iter()
            .map(|s| s.position)
            .collect();
        assert_eq!(positions, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_update_stage() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();
        let stage = fixture.pipeline.create_stage(NewStage::new("Vote"), &actor).await.unwrap();

        let updated = fixture
            .pipeline
            .update_stage(
                stage.id,
                StagePatch::new()
                    .with_name("  Board Vote ")
                    .with_terminal(true)
                    .with_outcome(ConfiguredOutcome::Endorsed),
                &actor,
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Board Vote");
        assert!(updated.is_terminal);
        assert_eq!(updated.position, stage.position);
        assert_eq!(fixture.pipeline.get_stage(stage.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_stage_rejects_outcome_on_non_terminal() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();
        let stage = fixture
            .pipeline
            .create_stage(NewStage::terminal("Endorsed", ConfiguredOutcome::Endorsed), &actor)
            .await
            .unwrap();

        let err = fixture
            .pipeline
            .update_stage(stage.id, StagePatch::new().with_terminal(false), &actor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let updated = fixture
            .pipeline
            .update_stage(
                stage.id,
                StagePatch::new()
                    .with_terminal(false)
                    .with_outcome(ConfiguredOutcome::None),
                &actor,
            )
            .await
            .unwrap();
        assert!(!updated.is_terminal);
    }

    #[tokio::test]
    async fn test_terminal_flag_kept_while_occupied() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let actor = fixture.actor();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();
        fixture
            .pipeline
            .advance(endorsement.id, stages.endorsed.id, None, &actor)
            .await
            .unwrap();

        let err = fixture
            .pipeline
            .update_stage(
                stages.endorsed.id,
                StagePatch::new()
                    .with_terminal(false)
                    .with_outcome(ConfiguredOutcome::None),
                &actor,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(fixture.pipeline.get_stage(stages.endorsed.id).await.unwrap(), stages.endorsed);
    }

    #[tokio::test]
    async fn test_update_unknown_stage() {
        let fixture = PipelineFixture::new();
        let err = fixture
            .pipeline
            .update_stage(Uuid::new_v4(), StagePatch::new().with_name("X"), &fixture.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_stages_with_counts() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        for _ in 0..2 {
            fixture.create_at(stages.research.id).await.unwrap();
        }
        fixture.create_at(stages.interview.id).await.unwrap();

        let counts: Vec<_> = fixture
            .pipeline
            .list_stages_with_counts()
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.stage.name, s.endorsement_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("Research".to_string(), 2),
                ("Interview".to_string(), 1),
                ("Endorsed".to_string(), 0),
                ("Not Endorsed".to_string(), 0),
                ("No Endorsement".to_string(), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_next_stage() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();

        let next = fixture.pipeline.next_stage(stages.research.id).await.unwrap();
        assert_eq!(next.map(|s| s.id), Some(stages.interview.id));

        let last = fixture.pipeline.next_stage(stages.no_endorsement.id).await.unwrap();
        assert!(last.is_none());
    }

    #[tokio::test]
    async fn test_backfill_configured_outcomes() {
        let fixture = PipelineFixture::new();
        let actor = fixture.actor();
        let legacy = fixture
            .pipeline
            .create_stage(NewStage::new("Not Endorsed").with_terminal(true), &actor)
            .await
            .unwrap();
        let odd = fixture
            .pipeline
            .create_stage(NewStage::new("Withdrawn").with_terminal(true), &actor)
            .await
            .unwrap();
        fixture.pipeline.create_stage(NewStage::new("Research"), &actor).await.unwrap();

        let report = fixture.pipeline.backfill_configured_outcomes(&actor).await.unwrap();
        assert_eq!(report.updated.len(), 1);
        assert_eq!(report.updated[0].id, legacy.id);
        assert_eq!(report.unresolved, vec![odd]);

        let stored = fixture.pipeline.get_stage(legacy.id).await.unwrap();
        assert_eq!(stored.configured_outcome, ConfiguredOutcome::NotEndorsed);
        assert_eq!(fixture.sink.events_of_type("stage.outcomes_backfilled").len(), 1);

        let again = fixture.pipeline.backfill_configured_outcomes(&actor).await.unwrap();
        assert!(again.updated.is_empty());
    }
}
