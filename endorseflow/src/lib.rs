//! # Endorseflow
//!
//! The engine behind an organizational endorsement process: candidates and
//! ballot measures move through an ordered set of review stages and end in a
//! final, irrevocable decision.
//!
//! Endorseflow provides:
//!
//! - **Stage registry**: ordered, uniquely positioned stages with terminal
//!   flags and configured outcomes
//! - **Endorsement records**: the subjects moving through the pipeline
//! - **History ledger**: one occupancy interval per stage visited
//! - **Advancement protocol**: transactional transitions that lock the
//!   decision on entering a terminal stage
//! - **Audit facts**: post-commit events for an external activity log
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use endorseflow::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = EndorsementPipeline::new(Arc::new(InMemoryPipelineStore::new()));
//! let actor = ActingIdentity::new(user_id);
//!
//! let research = pipeline.create_stage(NewStage::new("Research"), &actor).await?;
//! let endorsed = pipeline
//!     .create_stage(NewStage::terminal("Endorsed", ConfiguredOutcome::Endorsed), &actor)
//!     .await?;
//!
//! let created = pipeline
//!     .create_endorsement(NewEndorsement::new(candidate_id, race_id, research.id), &actor)
//!     .await?;
//! let detail = pipeline
//!     .advance(created.endorsement.id, endorsed.id, Some("Board vote".into()), &actor)
//!     .await?;
//! assert_eq!(detail.endorsement.decision, Decision::Endorsed);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{OutcomeResolution, PipelineConfig};
    pub use crate::context::ActingIdentity;
    pub use crate::core::{
        ConfiguredOutcome, Decision, Endorsement, EndorsementDetail, EndorsementFilter,
        MetadataPatch, NewEndorsement, NewStage, Page, PageRequest, Stage, StageHistoryEntry,
        StagePatch, StagePosition, StageWithCount,
    };
    pub use crate::errors::{ErrorKind, PipelineError, PipelineResult};
    pub use crate::events::{AuditFact, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{CreatedEndorsement, EndorsementPipeline};
    pub use crate::store::{InMemoryPipelineStore, PipelineStore, StoreTransaction};
    pub use crate::utils::{Clock, SystemClock, Timestamp};
}
