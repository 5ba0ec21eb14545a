//! Core data model for the endorsement pipeline.
//!
//! This module contains the fundamental records shared by every other part
//! of the crate:
//! - Stages and their configured outcomes
//! - Endorsements and their decisions
//! - Stage history ledger entries

mod endorsement;
mod history;
mod outcome;
mod stage;

pub use endorsement::{
    Endorsement, EndorsementDetail, EndorsementFilter, MetadataPatch, NewEndorsement, Page,
    PageRequest,
};
pub use history::StageHistoryEntry;
pub use outcome::{ConfiguredOutcome, Decision};
pub use stage::{
    NewStage, Stage, StagePatch, StagePosition, StageWithCount, DEFAULT_STAGE_COLOR,
};
