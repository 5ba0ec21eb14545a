//! Configured outcome and decision enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The decision an administrator attaches to a terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConfiguredOutcome {
    /// No outcome configured.
    #[default]
    None,
    /// Entering the stage endorses the candidate.
    Endorsed,
    /// Entering the stage declines to endorse the candidate.
    NotEndorsed,
    /// Entering the stage records that no endorsement is made in the race.
    NoEndorsement,
}

impl ConfiguredOutcome {
    /// Returns true if an outcome is actually configured.
    #[must_use]
    pub const fn is_set(self) -> bool {
        !matches!(self, Self::None)
    }

    /// The decision produced by entering a stage with this outcome.
    #[must_use]
    pub const fn to_decision(self) -> Decision {
        match self {
            Self::None => Decision::Pending,
            Self::Endorsed => Decision::Endorsed,
            Self::NotEndorsed => Decision::NotEndorsed,
            Self::NoEndorsement => Decision::NoEndorsement,
        }
    }

    /// Derives an outcome from a legacy stage name.
    ///
    /// Matching is a case-insensitive substring test, checked in priority
    /// order: "not endorsed", then "no endorsement", then "endorsed".
    #[must_use]
    pub fn from_stage_name(name: &str) -> Self {
        let lowered = name.to_lowercase();
        if lowered.contains("not endorsed") {
            Self::NotEndorsed
        } else if lowered.contains("no endorsement") {
            Self::NoEndorsement
        } else if lowered.contains("endorsed") {
            Self::Endorsed
        } else {
            Self::None
        }
    }
}

impl fmt::Display for ConfiguredOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Endorsed => write!(f, "endorsed"),
            Self::NotEndorsed => write!(f, "not-endorsed"),
            Self::NoEndorsement => write!(f, "no-endorsement"),
        }
    }
}

/// The decision recorded on an endorsement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    /// No final decision yet.
    #[default]
    Pending,
    /// The candidate was endorsed.
    Endorsed,
    /// The candidate was not endorsed.
    NotEndorsed,
    /// No endorsement was made.
    NoEndorsement,
}

impl Decision {
    /// Returns true if this is a resolved (non-pending) decision.
    #[must_use]
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Endorsed => write!(f, "endorsed"),
            Self::NotEndorsed => write!(f, "not-endorsed"),
            Self::NoEndorsement => write!(f, "no-endorsement"),
        }
    }
}
