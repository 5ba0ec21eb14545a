//! Endorsement record operations.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::EndorsementPipeline;
use crate::context::ActingIdentity;
use crate::core::{
    Decision, Endorsement, EndorsementDetail, EndorsementFilter, MetadataPatch, NewEndorsement,
    Page, PageRequest, StageHistoryEntry,
};
use crate::errors::{PipelineError, PipelineResult, StoreError};
use crate::events::{event_types, AuditFact};
use crate::store::StoreTransaction;
use crate::utils::validation::validate_notes;

/// A freshly created endorsement and its opening history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEndorsement {
    /// The endorsement.
    pub endorsement: Endorsement,
    /// The history entry opened at the initial stage.
    pub initial_entry: StageHistoryEntry,
}

pub(super) async fn load_endorsement(
    tx: &mut dyn StoreTransaction,
    id: Uuid,
) -> PipelineResult<Endorsement> {
    tx.get_endorsement(id)
        .await?
        .ok_or_else(|| PipelineError::endorsement_not_found(id))
}

pub(super) async fn load_detail(
    tx: &mut dyn StoreTransaction,
    endorsement: Endorsement,
) -> PipelineResult<EndorsementDetail> {
    let current_stage = tx.get_stage(endorsement.current_stage_id).await?.ok_or_else(|| {
        StoreError::new(format!(
            "endorsement {} references missing stage {}",
            endorsement.id, endorsement.current_stage_id
        ))
    })?;
    Ok(EndorsementDetail {
        endorsement,
        current_stage,
    })
}

impl EndorsementPipeline {
    /// Creates an endorsement at its initial stage together with the opening
    /// history entry.
    pub async fn create_endorsement(
        &self,
        input: NewEndorsement,
        actor: &ActingIdentity,
    ) -> PipelineResult<CreatedEndorsement> {
        validate_notes(input.notes.as_deref(), self.config.max_notes_len)?;

        let mut tx = self.begin().await?;
        let initial_stage = tx.get_stage(input.initial_stage_id).await?.ok_or_else(|| {
            PipelineError::invalid_field(
                "initialStageId",
                format!("Initial stage {} does not exist", input.initial_stage_id),
            )
        })?;
        if let Some(previous_id) = input.previous_endorsement_id {
            if tx.get_endorsement(previous_id).await?.is_none() {
                return Err(PipelineError::invalid_field(
                    "previousEndorsementId",
                    format!("Previous endorsement {previous_id} does not exist"),
                ));
            }
        }

        let endorsement = Endorsement {
            id: Uuid::now_v7(),
            candidate_id: input.candidate_id,
            race_id: input.race_id,
            current_stage_id: initial_stage.id,
            decision: Decision::Pending,
            locked_at: None,
            assigned_to_id: input.assigned_to_id,
            notes: input.notes,
            previous_endorsement_id: input.previous_endorsement_id,
        };
        let initial_entry =
            StageHistoryEntry::open(endorsement.id, initial_stage.id, self.clock.now(), None);

        tx.insert_endorsement(endorsement.clone()).await?;
        tx.insert_history_entry(initial_entry.clone()).await?;
        tx.commit().await?;

        info!(
            endorsement_id = %endorsement.id,
            candidate_id = %endorsement.candidate_id,
            race_id = %endorsement.race_id,
            stage = %initial_stage.name,
            "Endorsement created"
        );
        self.audit(
            &AuditFact::new(
                event_types::ENDORSEMENT_CREATED,
                actor,
                Some(endorsement.id),
                initial_entry.entered_at,
            )
            .with_details(serde_json::json!({
                "candidateId": endorsement.candidate_id,
                "raceId": endorsement.race_id,
                "stage": initial_stage.name,
            })),
        );

        Ok(CreatedEndorsement {
            endorsement,
            initial_entry,
        })
    }

    /// Looks up one endorsement.
    pub async fn get_endorsement(&self, id: Uuid) -> PipelineResult<Endorsement> {
        let mut tx = self.begin().await?;
        let endorsement = load_endorsement(tx.as_mut(), id).await;
        tx.rollback().await?;
        endorsement
    }

    /// Looks up one endorsement with its current stage populated.
    pub async fn get_endorsement_detail(&self, id: Uuid) -> PipelineResult<EndorsementDetail> {
        let mut tx = self.begin().await?;
        let endorsement = load_endorsement(tx.as_mut(), id).await?;
        let detail = load_detail(tx.as_mut(), endorsement).await?;
        tx.rollback().await?;
        Ok(detail)
    }

    /// Lists endorsements matching `filter`, one page at a time.
    pub async fn list_endorsements(
        &self,
        filter: EndorsementFilter,
        page: PageRequest,
    ) -> PipelineResult<Page<Endorsement>> {
        let page_size = page.page_size.unwrap_or(self.config.default_page_size);
        if page_size == 0 || page_size > self.config.max_page_size {
            return Err(PipelineError::invalid_field(
                "pageSize",
                format!(
                    "Page size must be between 1 and {}",
                    self.config.max_page_size
                ),
            ));
        }
        if page.page == 0 {
            return Err(PipelineError::invalid_field("page", "Pages start at 1"));
        }

        let offset = (page.page - 1).saturating_mul(page_size);
        let mut tx = self.begin().await?;
        let (items, total) = tx.list_endorsements(&filter, offset, page_size).await?;
        tx.rollback().await?;

        Ok(Page {
            items,
            page: page.page,
            page_size,
            total,
        })
    }

    /// Edits assignee and notes of an endorsement that is not locked.
    pub async fn update_metadata(
        &self,
        id: Uuid,
        patch: MetadataPatch,
        actor: &ActingIdentity,
    ) -> PipelineResult<Endorsement> {
        if let Some(ref notes) = patch.notes {
            validate_notes(notes.as_deref(), self.config.max_notes_len)?;
        }

        let mut tx = self.begin().await?;
        tx.lock_endorsement(id).await?;
        let mut endorsement = load_endorsement(tx.as_mut(), id).await?;
        if let Some(locked_at) = endorsement.locked_at {
            return Err(PipelineError::locked(id, locked_at));
        }
        if patch.is_empty() {
            tx.rollback().await?;
            return Ok(endorsement);
        }

        if let Some(assignee) = patch.assigned_to_id {
            endorsement.assigned_to_id = assignee;
        }
        if let Some(notes) = patch.notes {
            endorsement.notes = notes;
        }

        tx.update_endorsement(endorsement.clone()).await?;
        tx.commit().await?;

        info!(endorsement_id = %id, "Endorsement metadata updated");
        self.audit(
            &AuditFact::new(event_types::ENDORSEMENT_UPDATED, actor, Some(id), self.clock.now())
                .with_details(serde_json::json!({
                    "assignedToId": endorsement.assigned_to_id,
                    "notes": endorsement.notes,
                })),
        );
        Ok(endorsement)
    }

    /// Deletes an endorsement together with its history.
    pub async fn delete_endorsement(&self, id: Uuid, actor: &ActingIdentity) -> PipelineResult<()> {
        let mut tx = self.begin().await?;
        tx.lock_endorsement(id).await?;
        let endorsement = load_endorsement(tx.as_mut(), id).await?;

        tx.delete_endorsement(id).await?;
        tx.commit().await?;

        info!(endorsement_id = %id, "Endorsement deleted");
        self.audit(
            &AuditFact::new(event_types::ENDORSEMENT_DELETED, actor, Some(id), self.clock.now())
                .with_details(serde_json::json!({
                    "candidateId": endorsement.candidate_id,
                    "raceId": endorsement.race_id,
                    "decision": endorsement.decision,
                })),
        );
        Ok(())
    }
}
