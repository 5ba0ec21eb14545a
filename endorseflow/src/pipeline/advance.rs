//! Advancement protocol: the endorsement state machine.
//!
//! States are stage identifiers. Movement between non-terminal stages is
//! unrestricted in either direction; position is display order only. Entering
//! a terminal stage locks the endorsement, after which no transition is
//! accepted.

use tracing::{info, warn};
use uuid::Uuid;

use super::records::{load_detail, load_endorsement};
use super::registry::load_stage;
use super::EndorsementPipeline;
use crate::config::OutcomeResolution;
use crate::context::ActingIdentity;
use crate::core::{ConfiguredOutcome, Decision, EndorsementDetail, Stage, StageHistoryEntry};
use crate::errors::{PipelineError, PipelineResult, StoreError};
use crate::events::{event_types, AuditFact};
use crate::utils::format_timestamp;
use crate::utils::validation::validate_notes;

/// The decision produced by entering `stage`.
///
/// Non-terminal stages always yield `pending`. A terminal stage yields its
/// configured outcome; without one, [`OutcomeResolution::NameFallback`]
/// derives it from the stage name and [`OutcomeResolution::ConfiguredOnly`]
/// leaves it `pending`.
#[must_use]
pub fn resolve_decision(stage: &Stage, resolution: OutcomeResolution) -> Decision {
    if !stage.is_terminal {
        return Decision::Pending;
    }
    if stage.configured_outcome.is_set() {
        return stage.configured_outcome.to_decision();
    }
    match resolution {
        OutcomeResolution::NameFallback => ConfiguredOutcome::from_stage_name(&stage.name).to_decision(),
        OutcomeResolution::ConfiguredOnly => Decision::Pending,
    }
}

impl EndorsementPipeline {
    /// Moves an endorsement to `target_stage_id`.
    ///
    /// Closes the open history entry, opens one at the target, updates the
    /// decision and, when the target is terminal, stamps the lock. All of it
    /// commits together or not at all. The audit fact is emitted after commit.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the endorsement or the target stage does not exist
    /// - `Locked` if the endorsement already has a final decision
    /// - `Validation` if the notes are too long
    /// - `ConcurrentModification` if the row lock could not be taken in time
    pub async fn advance(
        &self,
        endorsement_id: Uuid,
        target_stage_id: Uuid,
        notes: Option<String>,
        actor: &ActingIdentity,
    ) -> PipelineResult<EndorsementDetail> {
        validate_notes(notes.as_deref(), self.config.max_notes_len)?;

        let mut tx = self.begin().await?;
        tx.lock_endorsement(endorsement_id).await?;

        let mut endorsement = load_endorsement(tx.as_mut(), endorsement_id).await?;
        let target = load_stage(tx.as_mut(), target_stage_id).await?;
        if let Some(locked_at) = endorsement.locked_at {
            return Err(PipelineError::locked(endorsement_id, locked_at));
        }
        let from_stage = tx.get_stage(endorsement.current_stage_id).await?;

        let open = tx.open_history_entry(endorsement_id).await?.ok_or_else(|| {
            StoreError::new(format!(
                "endorsement {endorsement_id} has no open history entry"
            ))
        })?;
        let transition_at = self.clock.now().max(open.entered_at);

        let decision = resolve_decision(&target, self.config.outcome_resolution);
        tx.update_history_entry(open.closed_at(transition_at)).await?;
        tx.insert_history_entry(StageHistoryEntry::open(
            endorsement_id,
            target.id,
            transition_at,
            notes.clone(),
        ))
        .await?;

        endorsement.current_stage_id = target.id;
        endorsement.decision = decision;
        if target.is_terminal {
            endorsement.locked_at = Some(transition_at);
        }
        tx.update_endorsement(endorsement.clone()).await?;

        let detail = load_detail(tx.as_mut(), endorsement).await?;
        tx.commit().await?;

        let from_name = from_stage.map(|s| s.name);
        info!(
            endorsement_id = %endorsement_id,
            from_stage = from_name.as_deref().unwrap_or("<deleted>"),
            to_stage = %target.name,
            decision = %decision,
            locked = target.is_terminal,
            "Endorsement advanced"
        );
        if target.is_terminal && decision == Decision::Pending {
            warn!(
                endorsement_id = %endorsement_id,
                stage = %target.name,
                "Locked at terminal stage without a resolvable outcome; decision stays pending"
            );
        }

        self.audit(
            &AuditFact::new(
                event_types::ENDORSEMENT_ADVANCED,
                actor,
                Some(endorsement_id),
                transition_at,
            )
            .with_details(serde_json::json!({
                "endorsementId": endorsement_id,
                "actorId": actor.user_id,
                "requestId": actor.request_id,
                "fromStage": from_name,
                "toStage": target.name,
                "decision": decision,
                "lockedAt": detail.endorsement.locked_at.as_ref().map(format_timestamp),
                "notes": notes,
            })),
        );

        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_STAGE_COLOR;
    use crate::errors::ErrorKind;
    use crate::testing::PipelineFixture;
    use pretty_assertions::assert_eq;

    fn terminal(name: &str, outcome: ConfiguredOutcome) -> Stage {
        Stage {
            id: Uuid::new_v4(),
            name: name.to_string(),
            position: 0,
            is_terminal: true,
            configured_outcome: outcome,
            color: DEFAULT_STAGE_COLOR.to_string(),
        }
    }

    #[test]
    fn test_resolve_non_terminal_is_pending() {
        let mut stage = terminal("Endorsed", ConfiguredOutcome::None);
        stage.is_terminal = false;
        assert_eq!(
            resolve_decision(&stage, OutcomeResolution::NameFallback),
            Decision::Pending
        );
    }

    #[test]
    fn test_resolve_configured_outcome_wins() {
        let stage = terminal("Not Endorsed", ConfiguredOutcome::Endorsed);
        assert_eq!(
            resolve_decision(&stage, OutcomeResolution::NameFallback),
            Decision::Endorsed
        );
        assert_eq!(
            resolve_decision(&stage, OutcomeResolution::ConfiguredOnly),
            Decision::Endorsed
        );
    }

    #[test]
    fn test_resolve_name_fallback_priority() {
        let cases = [
            ("Not Endorsed", Decision::NotEndorsed),
            ("NO ENDORSEMENT made", Decision::NoEndorsement),
            ("Endorsed by board", Decision::Endorsed),
            ("Withdrawn", Decision::Pending),
        ];
        for (name, expected) in cases {
            let stage = terminal(name, ConfiguredOutcome::None);
            assert_eq!(
                resolve_decision(&stage, OutcomeResolution::NameFallback),
                expected,
                "stage name {name:?}"
            );
        }
    }

    #[test]
    fn test_resolve_configured_only_ignores_name() {
        let stage = terminal("Endorsed", ConfiguredOutcome::None);
        assert_eq!(
            resolve_decision(&stage, OutcomeResolution::ConfiguredOnly),
            Decision::Pending
        );
    }

    #[tokio::test]
    async fn test_advance_between_open_stages() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();

        let detail = fixture
            .pipeline
            .advance(
                endorsement.id,
                stages.interview.id,
                Some("Scheduled".to_string()),
                &fixture.actor(),
            )
            .await
            .unwrap();

        assert_eq!(detail.current_stage, stages.interview);
        assert_eq!(detail.endorsement.decision, Decision::Pending);
        assert!(detail.endorsement.locked_at.is_none());

        let history = fixture.pipeline.get_history(endorsement.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].is_open());
        assert!(history[1].is_open());
        assert_eq!(history[1].notes.as_deref(), Some("Scheduled"));
    }

    #[tokio::test]
    async fn test_advance_backwards_is_allowed() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.interview.id).await.unwrap();

        let detail = fixture
            .pipeline
            .advance(endorsement.id, stages.research.id, None, &fixture.actor())
            .await
            .unwrap();
        assert_eq!(detail.endorsement.current_stage_id, stages.research.id);
    }

    #[tokio::test]
    async fn test_advance_to_terminal_locks() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();
        let before = fixture.clock_now();

        let detail = fixture
            .pipeline
            .advance(endorsement.id, stages.endorsed.id, None, &fixture.actor())
            .await
            .unwrap();

        assert_eq!(detail.endorsement.decision, Decision::Endorsed);
        let locked_at = detail.endorsement.locked_at.unwrap();
        assert!(locked_at >= before);
    }

    #[tokio::test]
    async fn test_advance_locked_is_rejected_without_changes() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();
        fixture
            .pipeline
            .advance(endorsement.id, stages.not_endorsed.id, None, &fixture.actor())
            .await
            .unwrap();
        let history_before = fixture.pipeline.get_history(endorsement.id).await.unwrap();
        let record_before = fixture.pipeline.get_endorsement(endorsement.id).await.unwrap();

        let err = fixture
            .pipeline
            .advance(endorsement.id, stages.research.id, None, &fixture.actor())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Locked);
        assert_eq!(err.status_code(), 403);
        assert_eq!(
            fixture.pipeline.get_endorsement(endorsement.id).await.unwrap(),
            record_before
        );
        assert_eq!(
            fixture.pipeline.get_history(endorsement.id).await.unwrap(),
            history_before
        );
    }

    #[tokio::test]
    async fn test_advance_not_found() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();

        let err = fixture
            .pipeline
            .advance(Uuid::new_v4(), stages.interview.id, None, &fixture.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = fixture
            .pipeline
            .advance(endorsement.id, Uuid::new_v4(), None, &fixture.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(fixture.pipeline.get_history(endorsement.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_advance_rejects_oversized_notes() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();
        let notes = "x".repeat(fixture.pipeline.config().max_notes_len + 1);

        let err = fixture
            .pipeline
            .advance(endorsement.id, stages.interview.id, Some(notes), &fixture.actor())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_advance_emits_audit_after_commit() {
        let fixture = PipelineFixture::new();
        let stages = fixture.seed_standard_stages().await.unwrap();
        let endorsement = fixture.create_at(stages.research.id).await.unwrap();

        fixture
            .pipeline
            .advance(
                endorsement.id,
                stages.endorsed.id,
                Some("Board vote".to_string()),
                &fixture.actor(),
            )
            .await
            .unwrap();

        let events = fixture.sink.events_of_type("endorsement.advanced");
        assert_eq!(events.len(), 1);
        let details = &events[0].1.as_ref().unwrap()["details"];
        assert_eq!(details["fromStage"], "Research");
        assert_eq!(details["toStage"], "Endorsed");
        assert_eq!(details["decision"], "endorsed");
        assert_eq!(details["notes"], "Board vote");
        assert!(details["lockedAt"].is_string());
    }
}
