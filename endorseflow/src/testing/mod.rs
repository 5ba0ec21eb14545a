//! Testing utilities for endorsement pipelines.
//!
//! This module provides:
//! - A pipeline fixture with a manual clock and a collecting audit sink
//! - A fault-injecting store wrapper
//! - Assertions for endorsement state and history chains

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_error_kind, assert_history_chain, assert_locked_with, assert_pending_unlocked,
};
pub use fixtures::{PipelineFixture, StandardStages};
pub use mocks::{FaultPoint, FaultyStore};
