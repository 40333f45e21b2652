use serde::{Deserialize, Serialize};

use crate::domain::Lane;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneCounts {
    pub queued: usize,
    pub running: usize,
    pub retry_scheduled: usize,
}

impl LaneCounts {
    pub fn outstanding(&self) -> usize {
        self.queued + self.running + self.retry_scheduled
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub immediate: LaneCounts,
    pub routine: LaneCounts,

    /// Entries acked since start.
    pub completed: usize,

    /// Entries given up on since start.
    pub dead: usize,
}

impl QueueCounts {
    pub fn lane(&self, lane: Lane) -> &LaneCounts {
        match lane {
            Lane::Immediate => &self.immediate,
            Lane::Routine => &self.routine,
        }
    }

    pub fn lane_mut(&mut self, lane: Lane) -> &mut LaneCounts {
        match lane {
            Lane::Immediate => &mut self.immediate,
            Lane::Routine => &mut self.routine,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.immediate.outstanding() + self.routine.outstanding()
    }
}
