//! Transactional storage seam.
//!
//! The pipeline never touches rows directly. It opens a [`StoreTransaction`]
//! through a [`PipelineStore`], reads and writes inside it, and either commits
//! or lets it drop. Dropping an uncommitted transaction rolls it back and
//! releases every lock it holds, which is also what happens when the caller's
//! future is cancelled mid-operation.
//!
//! Locking model:
//! - [`StoreTransaction::lock_endorsement`] is the `SELECT ... FOR UPDATE`
//!   analogue. It serializes writers of one endorsement and nothing else.
//! - [`StoreTransaction::lock_registry`] serializes stage registry writers so
//!   that position computation and insert happen as one unit.
//!
//! Uniqueness of stage positions and names is checked when a transaction
//! commits, never between individual writes.

mod memory;

pub use memory::{InMemoryPipelineStore, InMemoryTransaction};

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::core::{Endorsement, EndorsementFilter, Stage, StageHistoryEntry, StagePosition};
use crate::errors::PipelineResult;

/// Per-transaction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Bound on waiting for any single lock.
    pub lock_timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Factory for transactions against a backing store.
#[async_trait]
pub trait PipelineStore: Send + Sync + fmt::Debug {
    /// Opens a new transaction.
    async fn begin(&self, options: TransactionOptions) -> PipelineResult<Box<dyn StoreTransaction>>;
}

/// One open transaction.
///
/// Reads observe committed state. Writes become visible to others only after
/// [`StoreTransaction::commit`] succeeds.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Takes the registry-wide write lock until the transaction ends.
    async fn lock_registry(&mut self) -> PipelineResult<()>;

    /// Takes the row lock for one endorsement until the transaction ends.
    async fn lock_endorsement(&mut self, id: Uuid) -> PipelineResult<()>;

    /// All stages by ascending position.
    async fn list_stages(&mut self) -> PipelineResult<Vec<Stage>>;

    /// One stage.
    async fn get_stage(&mut self, id: Uuid) -> PipelineResult<Option<Stage>>;

    /// Number of endorsements whose current stage is `stage_id`.
    async fn count_endorsements_at_stage(&mut self, stage_id: Uuid) -> PipelineResult<usize>;

    /// Current-stage counts for every stage that has at least one endorsement.
    async fn stage_occupancy(&mut self) -> PipelineResult<HashMap<Uuid, usize>>;

    /// Inserts a stage.
    async fn insert_stage(&mut self, stage: Stage) -> PipelineResult<()>;

    /// Replaces a stage row.
    async fn update_stage(&mut self, stage: Stage) -> PipelineResult<()>;

    /// Deletes a stage row.
    async fn delete_stage(&mut self, id: Uuid) -> PipelineResult<()>;

    /// Rewrites the positions of the listed stages together.
    async fn set_stage_positions(&mut self, positions: Vec<StagePosition>) -> PipelineResult<()>;

    /// One endorsement.
    async fn get_endorsement(&mut self, id: Uuid) -> PipelineResult<Option<Endorsement>>;

    /// A window of matching endorsements in creation order, plus the total
    /// number of matches.
    async fn list_endorsements(
        &mut self,
        filter: &EndorsementFilter,
        offset: usize,
        limit: usize,
    ) -> PipelineResult<(Vec<Endorsement>, usize)>;

    /// Inserts an endorsement.
    async fn insert_endorsement(&mut self, endorsement: Endorsement) -> PipelineResult<()>;

    /// Replaces an endorsement row.
    async fn update_endorsement(&mut self, endorsement: Endorsement) -> PipelineResult<()>;

    /// Deletes an endorsement and its history.
    async fn delete_endorsement(&mut self, id: Uuid) -> PipelineResult<()>;

    /// History of one endorsement by ascending entry time.
    async fn history(&mut self, endorsement_id: Uuid) -> PipelineResult<Vec<StageHistoryEntry>>;

    /// The entry with no exit time, if any.
    async fn open_history_entry(
        &mut self,
        endorsement_id: Uuid,
    ) -> PipelineResult<Option<StageHistoryEntry>>;

    /// Appends a history entry.
    async fn insert_history_entry(&mut self, entry: StageHistoryEntry) -> PipelineResult<()>;

    /// Replaces a history entry.
    async fn update_history_entry(&mut self, entry: StageHistoryEntry) -> PipelineResult<()>;

    /// Atomically applies every buffered write.
    async fn commit(self: Box<Self>) -> PipelineResult<()>;

    /// Discards every buffered write and releases locks.
    async fn rollback(self: Box<Self>) -> PipelineResult<()>;
}
