//! Lifecycle state of one queued entry.

use serde::{Deserialize, Serialize};

/// Entry state.
///
/// State transitions:
/// - Queued -> Running -> (acked, entry removed)
/// - Queued -> Running -> Queued (re-delivery after a rate limit, attempt refunded)
/// - Queued -> Running -> RetryScheduled -> Queued (loop until max_attempts)
/// - Queued -> Running -> Dead (max_attempts exceeded or fatal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Ready to be claimed.
    Queued,

    /// Claimed by a worker.
    Running,

    /// Waiting for a delayed re-delivery.
    RetryScheduled,

    /// Failed permanently.
    Dead,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryState::Dead)
    }

    /// Still counts as outstanding work for dedup purposes.
    pub fn is_outstanding(self) -> bool {
        !self.is_terminal()
    }
}
