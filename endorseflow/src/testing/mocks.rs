//! Fault-injecting store for exercising failure paths.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::{Endorsement, EndorsementFilter, Stage, StageHistoryEntry, StagePosition};
use crate::errors::{PipelineResult, StoreError};
use crate::store::{PipelineStore, StoreTransaction, TransactionOptions};

/// A write the [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `insert_history_entry`.
    InsertHistory,
    /// `update_endorsement`.
    UpdateEndorsement,
    /// `commit`.
    Commit,
}

#[derive(Debug, Default)]
struct Faults {
    pending: HashMap<FaultPoint, usize>,
    triggered: HashMap<FaultPoint, usize>,
}

impl Faults {
    fn take(&mut self, point: FaultPoint) -> bool {
        match self.pending.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                *self.triggered.entry(point).or_default() += 1;
                true
            }
            _ => false,
        }
    }
}

/// Wraps a store and fails chosen operations a set number of times.
#[derive(Debug, Clone)]
pub struct FaultyStore {
    inner: Arc<dyn PipelineStore>,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyStore {
    /// Wraps `inner` with no faults armed.
    #[must_use]
    pub fn new(inner: Arc<dyn PipelineStore>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    /// Fails the next `times` calls at `point`.
    pub fn fail_next(&self, point: FaultPoint, times: usize) {
        *self.faults.lock().pending.entry(point).or_default() += times;
    }

    /// How many faults fired at `point`.
    #[must_use]
    pub fn triggered(&self, point: FaultPoint) -> usize {
        self.faults.lock().triggered.get(&point).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PipelineStore for FaultyStore {
    async fn begin(&self, options: TransactionOptions) -> PipelineResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(FaultyTransaction {
            inner: self.inner.begin(options).await?,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn StoreTransaction>,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyTransaction {
    fn check(&self, point: FaultPoint) -> PipelineResult<()> {
        if self.faults.lock().take(point) {
            Err(StoreError::new(format!("injected fault at {point:?}")).into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreTransaction for FaultyTransaction {
    async fn lock_registry(&mut self) -> PipelineResult<()> {
        self.inner.lock_registry().await
    }

    async fn lock_endorsement(&mut self, id: Uuid) -> PipelineResult<()> {
        self.inner.lock_endorsement(id).await
    }

    async fn list_stages(&mut self) -> PipelineResult<Vec<Stage>> {
        self.inner.list_stages().await
    }

    async fn get_stage(&mut self, id: Uuid) -> PipelineResult<Option<Stage>> {
        self.inner.get_stage(id).await
    }

    async fn count_endorsements_at_stage(&mut self, stage_id: Uuid) -> PipelineResult<usize> {
        self.inner.count_endorsements_at_stage(stage_id).await
    }

    async fn stage_occupancy(&mut self) -> PipelineResult<HashMap<Uuid, usize>> {
        self.inner.stage_occupancy().await
    }

    async fn insert_stage(&mut self, stage: Stage) -> PipelineResult<()> {
        self.inner.insert_stage(stage).await
    }

    async fn update_stage(&mut self, stage: Stage) -> PipelineResult<()> {
        self.inner.update_stage(stage).await
    }

    async fn delete_stage(&mut self, id: Uuid) -> PipelineResult<()> {
        self.inner.delete_stage(id).await
    }

    async fn set_stage_positions(&mut self, positions: Vec<StagePosition>) -> PipelineResult<()> {
        self.inner.set_stage_positions(positions).await
    }

    async fn get_endorsement(&mut self, id: Uuid) -> PipelineResult<Option<Endorsement>> {
        self.inner.get_endorsement(id).await
    }

    async fn list_endorsements(
        &mut self,
        filter: &EndorsementFilter,
        offset: usize,
        limit: usize,
    ) -> PipelineResult<(Vec<Endorsement>, usize)> {
        self.inner.list_endorsements(filter, offset, limit).await
    }

    async fn insert_endorsement(&mut self, endorsement: Endorsement) -> PipelineResult<()> {
        self.inner.insert_endorsement(endorsement).await
    }

    async fn update_endorsement(&mut self, endorsement: Endorsement) -> PipelineResult<()> {
        self.check(FaultPoint::UpdateEndorsement)?;
        self.inner.update_endorsement(endorsement).await
    }

    async fn delete_endorsement(&mut self, id: Uuid) -> PipelineResult<()> {
        self.inner.delete_endorsement(id).await
    }

    async fn history(&mut self, endorsement_id: Uuid) -> PipelineResult<Vec<StageHistoryEntry>> {
        self.inner.history(endorsement_id).await
    }

    async fn open_history_entry(
        &mut self,
        endorsement_id: Uuid,
    ) -> PipelineResult<Option<StageHistoryEntry>> {
        self.inner.open_history_entry(endorsement_id).await
    }

    async fn insert_history_entry(&mut self, entry: StageHistoryEntry) -> PipelineResult<()> {
        self.check(FaultPoint::InsertHistory)?;
        self.inner.insert_history_entry(entry).await
    }

    async fn update_history_entry(&mut self, entry: StageHistoryEntry) -> PipelineResult<()> {
        self.inner.update_history_entry(entry).await
    }

    async fn commit(self: Box<Self>) -> PipelineResult<()> {
        self.check(FaultPoint::Commit)?;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> PipelineResult<()> {
        self.inner.rollback().await
    }
}
