//! Test assertions for endorsements and their history.

use uuid::Uuid;

use crate::core::{Decision, Endorsement, StageHistoryEntry};
use crate::errors::{ErrorKind, PipelineResult};

/// Asserts that the endorsement is locked with the expected decision.
pub fn assert_locked_with(endorsement: &Endorsement, expected: Decision) {
    assert!(
        endorsement.locked_at.is_some(),
        "Expected endorsement {} to be locked",
        endorsement.id
    );
    assert_eq!(
        endorsement.decision, expected,
        "Expected decision {:?}, got {:?}",
        expected, endorsement.decision
    );
}

/// Asserts that the endorsement is still open for transitions.
pub fn assert_pending_unlocked(endorsement: &Endorsement) {
    assert!(
        endorsement.locked_at.is_none(),
        "Expected endorsement {} to be unlocked, locked at {:?}",
        endorsement.id,
        endorsement.locked_at
    );
    assert_eq!(endorsement.decision, Decision::Pending);
}

/// Asserts that a history visits `stage_ids` in order, that only the last
/// entry is open, and that timestamps never go backwards.
pub fn assert_history_chain(entries: &[StageHistoryEntry], stage_ids: &[Uuid]) {
    let visited: Vec<Uuid> = entries.iter().map(|e| e.stage_id).collect();
    assert_eq!(visited, stage_ids, "History visits unexpected stages");

    let open: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_open())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(
        open,
        vec![entries.len() - 1],
        "Expected exactly the last entry to be open"
    );

    for entry in entries {
        if let Some(exited_at) = entry.exited_at {
            assert!(exited_at >= entry.entered_at, "Entry {} exits before entering", entry.id);
        }
    }
    for pair in entries.windows(2) {
        assert!(
            pair[0].entered_at <= pair[1].entered_at,
            "Entry {} enters before its predecessor",
            pair[1].id
        );
        assert_eq!(
            pair[0].exited_at,
            Some(pair[1].entered_at),
            "Entry {} does not close when {} opens",
            pair[0].id,
            pair[1].id
        );
    }
}

/// Asserts that a result failed with the expected error kind.
pub fn assert_error_kind<T: std::fmt::Debug>(result: &PipelineResult<T>, expected: ErrorKind) {
    match result {
        Ok(value) => panic!("Expected {expected:?} error, got Ok({value:?})"),
        Err(err) => assert_eq!(
            err.kind(),
            expected,
            "Expected {:?} error, got {:?}: {}",
            expected,
            err.kind(),
            err
        ),
    }
}
