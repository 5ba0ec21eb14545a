//! The endorsement pipeline engine.
//!
//! This module provides:
//! - The stage registry and its reorder protocol
//! - Endorsement records and their metadata edits
//! - The stage history ledger and invariant audits
//! - The advancement protocol (the state machine)
//!
//! Every mutation runs inside one store transaction and emits its audit fact
//! only after that transaction has committed.

mod advance;
mod ledger;
mod records;
mod registry;
mod reorder;


pub use advance::resolve_decision;
pub use ledger::{check_endorsement_history, InvariantViolation};
pub use records::CreatedEndorsement;
pub use registry::BackfillReport;
pub use reorder::plan_reorder;

use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::events::{get_event_sink, AuditFact, EventSink};
use crate::errors::PipelineResult;
use crate::store::{PipelineStore, StoreTransaction, TransactionOptions};
use crate::utils::{Clock, SystemClock};

/// Entry point for every pipeline operation.
///
/// Cheap to clone; clones share the store, sink and clock.
#[derive(Clone)]
pub struct EndorsementPipeline {
    store: Arc<dyn PipelineStore>,
    sink: Option<Arc<dyn EventSink>>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl EndorsementPipeline {
    /// Creates a pipeline over a store with default configuration.
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self {
            store,
            sink: None,
            clock: Arc::new(SystemClock),
            config: PipelineConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the audit sink. Without one, the global sink is used.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn begin(&self) -> PipelineResult<Box<dyn StoreTransaction>> {
        self.store
            .begin(TransactionOptions {
                lock_timeout: self.config.lock_timeout(),
            })
            .await
    }

    fn event_sink(&self) -> Arc<dyn EventSink> {
        self.sink.clone().unwrap_or_else(get_event_sink)
    }

    /// Post-commit audit emission; never fails the caller.
    fn audit(&self, fact: &AuditFact) {
        let sink = self.event_sink();
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fact.emit_to(sink.as_ref());
        })) {
            warn!(event_type = %fact.event_type, "Audit sink panicked: {:?}", e);
        }
    }
}

impl fmt::Debug for EndorsementPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndorsementPipeline")
            .field("store", &self.store)
            .field("has_sink", &self.sink.is_some())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}
