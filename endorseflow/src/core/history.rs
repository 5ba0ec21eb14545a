//! Stage history ledger entries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::Timestamp;

/// One occupancy interval of one endorsement at one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageHistoryEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Owning endorsement.
    pub endorsement_id: Uuid,
    /// Stage occupied.
    pub stage_id: Uuid,
    /// When the endorsement entered the stage.
    pub entered_at: Timestamp,
    /// When it left; `None` while still occupying.
    pub exited_at: Option<Timestamp>,
    /// Notes supplied with the transition.
    pub notes: Option<String>,
}

impl StageHistoryEntry {
    /// Opens a new entry.
    #[must_use]
    pub fn open(
        endorsement_id: Uuid,
        stage_id: Uuid,
        entered_at: Timestamp,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            endorsement_id,
            stage_id,
            entered_at,
            exited_at: None,
            notes,
        }
    }

    /// Returns true while the entry is the current occupancy.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.exited_at.is_none()
    }

    /// Returns a closed copy of this entry.
    ///
    /// The exit time is never earlier than the entry time.
    #[must_use]
    pub fn closed_at(&self, at: Timestamp) -> Self {
        let mut closed = self.clone();
        closed.exited_at = Some(at.max(self.entered_at));
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_close_entry() {
        let now = Utc::now();
        let entry = StageHistoryEntry::open(Uuid::new_v4(), Uuid::new_v4(), now, None);
        assert!(entry.is_open());

        let closed = entry.closed_at(now + Duration::seconds(5));
        assert!(!closed.is_open());
        assert_eq!(closed.exited_at, Some(now + Duration::seconds(5)));
    }

    #[test]
    fn test_close_never_precedes_entry() {
        let now = Utc::now();
        let entry = StageHistoryEntry::open(Uuid::new_v4(), Uuid::new_v4(), now, None);

        let closed = entry.closed_at(now - Duration::seconds(30));
        assert_eq!(closed.exited_at, Some(now));
    }
}
