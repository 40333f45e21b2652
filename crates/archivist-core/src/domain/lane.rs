//! Urgency lanes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Urgency class a job executes under.
///
/// A lane is never part of a job's identity: the same job may be re-submitted
/// on a different lane, and the dedup guard treats both submissions as one
/// logical unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    /// User-facing freshness path.
    Immediate,

    /// Backfill / low-urgency path.
    Routine,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Immediate, Lane::Routine];

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Immediate => "immediate",
            Lane::Routine => "routine",
        }
    }

    /// Index into per-lane arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Lane::Immediate => 0,
            Lane::Routine => 1,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
