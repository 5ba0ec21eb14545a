//! In-memory transactional store.
//!
//! Committed state lives behind a single `RwLock`. A transaction buffers its
//! writes and, at commit, replays them onto a copy of the committed state,
//! checks every table constraint on the result, and only then swaps it in.
//! A failed commit leaves committed state untouched.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{PipelineStore, StoreTransaction, TransactionOptions};
use crate::core::{Endorsement, EndorsementFilter, Stage, StageHistoryEntry, StagePosition};
use crate::errors::{PipelineError, PipelineResult, StoreError};

#[derive(Debug, Clone)]
struct EndorsementRow {
    seq: u64,
    record: Endorsement,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    stages: HashMap<Uuid, Stage>,
    endorsements: HashMap<Uuid, EndorsementRow>,
    history: HashMap<Uuid, Vec<StageHistoryEntry>>,
    next_seq: u64,
}

#[derive(Debug, Clone)]
enum WriteOp {
    InsertStage(Stage),
    UpdateStage(Stage),
    DeleteStage(Uuid),
    SetPositions(Vec<StagePosition>),
    InsertEndorsement(Endorsement),
    UpdateEndorsement(Endorsement),
    DeleteEndorsement(Uuid),
    InsertHistory(StageHistoryEntry),
    UpdateHistory(StageHistoryEntry),
}

impl StoreState {
    fn apply(&mut self, op: WriteOp) -> PipelineResult<()> {
        match op {
            WriteOp::InsertStage(stage) => {
                if self.stages.contains_key(&stage.id) {
                    return Err(StoreError::new(format!("duplicate stage id {}", stage.id)).into());
                }
                self.stages.insert(stage.id, stage);
            }
            WriteOp::UpdateStage(stage) => {
                let Some(row) = self.stages.get_mut(&stage.id) else {
                    return Err(PipelineError::concurrent(format!(
                        "stage {} was deleted concurrently",
                        stage.id
                    )));
                };
                *row = stage;
            }
            WriteOp::DeleteStage(id) => {
                if self.stages.remove(&id).is_none() {
                    return Err(PipelineError::concurrent(format!(
                        "stage {id} was deleted concurrently"
                    )));
                }
            }
            WriteOp::SetPositions(positions) => {
                for entry in positions {
                    let Some(row) = self.stages.get_mut(&entry.id) else {
                        return Err(PipelineError::concurrent(format!(
                            "stage {} was deleted concurrently",
                            entry.id
                        )));
                    };
                    row.position = entry.position;
                }
            }
            WriteOp::InsertEndorsement(endorsement) => {
                if self.endorsements.contains_key(&endorsement.id) {
                    return Err(StoreError::new(format!(
                        "duplicate endorsement id {}",
                        endorsement.id
                    ))
                    .into());
                }
                let seq = self.next_seq;
                self.next_seq += 1;
                self.history.entry(endorsement.id).or_default();
                self.endorsements.insert(
                    endorsement.id,
                    EndorsementRow {
                        seq,
                        record: endorsement,
                    },
                );
            }
            WriteOp::UpdateEndorsement(endorsement) => {
                let Some(row) = self.endorsements.get_mut(&endorsement.id) else {
                    return Err(PipelineError::concurrent(format!(
                        "endorsement {} was deleted concurrently",
                        endorsement.id
                    )));
                };
                row.record = endorsement;
            }
            WriteOp::DeleteEndorsement(id) => {
                if self.endorsements.remove(&id).is_none() {
                    return Err(PipelineError::concurrent(format!(
                        "endorsement {id} was deleted concurrently"
                    )));
                }
                self.history.remove(&id);
            }
            WriteOp::InsertHistory(entry) => {
                if !self.endorsements.contains_key(&entry.endorsement_id) {
                    return Err(PipelineError::concurrent(format!(
                        "endorsement {} was deleted concurrently",
                        entry.endorsement_id
                    )));
                }
                self.history.entry(entry.endorsement_id).or_default().push(entry);
            }
            WriteOp::UpdateHistory(entry) => {
                let slot = self
                    .history
                    .get_mut(&entry.endorsement_id)
                    .and_then(|entries| entries.iter_mut().find(|e| e.id == entry.id));
                let Some(slot) = slot else {
                    return Err(PipelineError::concurrent(format!(
                        "history entry {} no longer exists",
                        entry.id
                    )));
                };
                *slot = entry;
            }
        }
        Ok(())
    }

    /// Table constraints checked at commit time.
    fn check_constraints(&self) -> Result<(), String> {
        let mut positions = HashSet::new();
        let mut names = HashSet::new();
        for stage in self.stages.values() {
            if !positions.insert(stage.position) {
                return Err(format!("duplicate stage position {}", stage.position));
            }
            if !names.insert(stage.name.to_lowercase()) {
                return Err(format!("duplicate stage name '{}'", stage.name));
            }
        }

        for row in self.endorsements.values() {
            let Some(stage) = self.stages.get(&row.record.current_stage_id) else {
                return Err(format!(
                    "endorsement {} references missing stage {}",
                    row.record.id, row.record.current_stage_id
                ));
            };
            if row.record.is_locked() && !stage.is_terminal {
                return Err(format!(
                    "locked endorsement {} sits on non-terminal stage '{}'",
                    row.record.id, stage.name
                ));
            }
        }

        for (endorsement_id, entries) in &self.history {
            if !self.endorsements.contains_key(endorsement_id) {
                return Err(format!("history for missing endorsement {endorsement_id}"));
            }
            if entries.iter().filter(|e| e.is_open()).count() > 1 {
                return Err(format!(
                    "endorsement {endorsement_id} has more than one open history entry"
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<StoreState>,
    row_locks: DashMap<Uuid, Arc<AsyncMutex<()>>>,
    registry_lock: Arc<AsyncMutex<()>>,
}

/// Reference [`PipelineStore`] keeping everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineStore {
    inner: Arc<Inner>,
}

impl InMemoryPipelineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.inner.state.read().stages.len()
    }

    /// Number of committed endorsements.
    #[must_use]
    pub fn endorsement_count(&self) -> usize {
        self.inner.state.read().endorsements.len()
    }

    /// Number of endorsement ids with a row lock held or awaited.
    #[must_use]
    pub fn tracked_row_locks(&self) -> usize {
        self.inner.row_locks.len()
    }

    /// Number of committed history entries across all endorsements.
    #[must_use]
    pub fn history_entry_count(&self) -> usize {
        self.inner.state.read().history.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn begin(&self, options: TransactionOptions) -> PipelineResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            writes: Vec::new(),
            row_guards: HashMap::new(),
            registry_guard: None,
            lock_timeout: options.lock_timeout,
            finished: false,
        }))
    }
}

/// A transaction against an [`InMemoryPipelineStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    inner: Arc<Inner>,
    writes: Vec<WriteOp>,
    row_guards: HashMap<Uuid, OwnedMutexGuard<()>>,
    registry_guard: Option<OwnedMutexGuard<()>>,
    lock_timeout: Duration,
    finished: bool,
}

impl InMemoryTransaction {
    async fn acquire(
        mutex: Arc<AsyncMutex<()>>,
        timeout: Duration,
        what: &str,
    ) -> PipelineResult<OwnedMutexGuard<()>> {
        tokio::time::timeout(timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                PipelineError::concurrent(format!(
                    "timed out after {}ms waiting for lock on {what}",
                    timeout.as_millis()
                ))
            })
    }

    /// Drops every held lock and forgets row mutexes nobody else holds or waits on.
    fn release(&mut self) {
        self.finished = true;
        for (id, guard) in self.row_guards.drain() {
            drop(guard);
            self.inner
                .row_locks
                .remove_if(&id, |_, mutex| Arc::strong_count(mutex) == 1);
        }
        self.registry_guard = None;
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn lock_registry(&mut self) -> PipelineResult<()> {
        if self.registry_guard.is_some() {
            return Ok(());
        }
        let mutex = Arc::clone(&self.inner.registry_lock);
        let guard = Self::acquire(mutex, self.lock_timeout, "stage registry").await?;
        self.registry_guard = Some(guard);
        Ok(())
    }

    async fn lock_endorsement(&mut self, id: Uuid) -> PipelineResult<()> {
        if self.row_guards.contains_key(&id) {
            return Ok(());
        }
        let mutex = Arc::clone(self.inner.row_locks.entry(id).or_default().value());
        let guard = Self::acquire(mutex, self.lock_timeout, &format!("endorsement {id}")).await?;
        self.row_guards.insert(id, guard);
        Ok(())
    }

    async fn list_stages(&mut self) -> PipelineResult<Vec<Stage>> {
        let mut stages: Vec<Stage> = self.inner.state.read().stages.values().cloned().collect();
        stages.sort_by_key(|s| s.position);
        Ok(stages)
    }

    async fn get_stage(&mut self, id: Uuid) -> PipelineResult<Option<Stage>> {
        Ok(self.inner.state.read().stages.get(&id).cloned())
    }

    async fn count_endorsements_at_stage(&mut self, stage_id: Uuid) -> PipelineResult<usize> {
        Ok(self
            .inner
            .state
            .read()
            .endorsements
            .values()
            .filter(|row| row.record.current_stage_id == stage_id)
            .count())
    }

    async fn stage_occupancy(&mut self) -> PipelineResult<HashMap<Uuid, usize>> {
        let state = self.inner.state.read();
        let mut counts = HashMap::new();
        for row in state.endorsements.values() {
            *counts.entry(row.record.current_stage_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_stage(&mut self, stage: Stage) -> PipelineResult<()> {
        self.writes.push(WriteOp::InsertStage(stage));
        Ok(())
    }

    async fn update_stage(&mut self, stage: Stage) -> PipelineResult<()> {
        self.writes.push(WriteOp::UpdateStage(stage));
        Ok(())
    }

    async fn delete_stage(&mut self, id: Uuid) -> PipelineResult<()> {
        self.writes.push(WriteOp::DeleteStage(id));
        Ok(())
    }

    async fn set_stage_positions(&mut self, positions: Vec<StagePosition>) -> PipelineResult<()> {
        self.writes.push(WriteOp::SetPositions(positions));
        Ok(())
    }

    async fn get_endorsement(&mut self, id: Uuid) -> PipelineResult<Option<Endorsement>> {
        Ok(self
            .inner
            .state
            .read()
            .endorsements
            .get(&id)
            .map(|row| row.record.clone()))
    }

    async fn list_endorsements(
        &mut self,
        filter: &EndorsementFilter,
        offset: usize,
        limit: usize,
    ) -> PipelineResult<(Vec<Endorsement>, usize)> {
        let state = self.inner.state.read();
        let mut matching: Vec<&EndorsementRow> = state
            .endorsements
            .values()
            .filter(|row| filter.matches(&row.record))
            .collect();
        matching.sort_by_key(|row| row.seq);

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| row.record.clone())
            .collect();
        Ok((items, total))
    }

    async fn insert_endorsement(&mut self, endorsement: Endorsement) -> PipelineResult<()> {
        self.writes.push(WriteOp::InsertEndorsement(endorsement));
        Ok(())
    }

    async fn update_endorsement(&mut self, endorsement: Endorsement) -> PipelineResult<()> {
        self.writes.push(WriteOp::UpdateEndorsement(endorsement));
        Ok(())
    }

    async fn delete_endorsement(&mut self, id: Uuid) -> PipelineResult<()> {
        self.writes.push(WriteOp::DeleteEndorsement(id));
        Ok(())
    }

    async fn history(&mut self, endorsement_id: Uuid) -> PipelineResult<Vec<StageHistoryEntry>> {
        let mut entries = self
            .inner
            .state
            .read()
            .history
            .get(&endorsement_id)
            .cloned()
            .unwrap_or_default();
        // Stable sort keeps insertion order for equal entry times
        entries.sort_by_key(|e| e.entered_at);
        Ok(entries)
    }

    async fn open_history_entry(
        &mut self,
        endorsement_id: Uuid,
    ) -> PipelineResult<Option<StageHistoryEntry>> {
        Ok(self
            .inner
            .state
            .read()
            .history
            .get(&endorsement_id)
            .and_then(|entries| entries.iter().find(|e| e.is_open()).cloned()))
    }

    async fn insert_history_entry(&mut self, entry: StageHistoryEntry) -> PipelineResult<()> {
        self.writes.push(WriteOp::InsertHistory(entry));
        Ok(())
    }

    async fn update_history_entry(&mut self, entry: StageHistoryEntry) -> PipelineResult<()> {
        self.writes.push(WriteOp::UpdateHistory(entry));
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> PipelineResult<()> {
        let writes = std::mem::take(&mut self.writes);
        {
            let mut committed = self.inner.state.write();
            let mut next = committed.clone();
            for op in writes {
                if let Err(err) = next.apply(op) {
                    drop(committed);
                    self.release();
                    return Err(err);
                }
            }
            if let Err(violation) = next.check_constraints() {
                drop(committed);
                self.release();
                debug!(%violation, "Commit rejected by constraint check");
                return Err(PipelineError::concurrent(format!(
                    "commit rejected: {violation}"
                )));
            }
            *committed = next;
        }

        self.release();
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> PipelineResult<()> {
        self.writes.clear();
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            debug!(
                pending_writes = self.writes.len(),
                "Transaction dropped without commit; rolling back"
            );
        }
        if !self.finished {
            self.release();
        }
    }
}
