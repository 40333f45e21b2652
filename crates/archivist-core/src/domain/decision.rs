//! Decision model: what the transport does with a failed attempt.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::ids::EntryId;
use super::record::EntryRecord;
use super::retry::RetryPolicy;

/// The next action for an entry whose attempt failed transiently.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Re-deliver after a delay.
    Retry { delay: Duration, reason: String },

    /// Give up.
    MarkDead { reason: String },
}

/// Decides the next action from the entry's bookkeeping.
///
/// Deciders are pure: applying the decision (updating the record, scheduling
/// the retry) is the queue's job.
pub trait Decider: Send + Sync {
    fn decide(&self, entry: &EntryRecord) -> Decision;
}

/// Attempt-based retry with exponential backoff.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, entry: &EntryRecord) -> Decision {
        if entry.attempts >= entry.max_attempts {
            Decision::MarkDead {
                reason: format!(
                    "max attempts reached: {}/{}",
                    entry.attempts, entry.max_attempts
                ),
            }
        } else {
            let delay = self.retry_policy.next_delay(entry.attempts);
            Decision::Retry {
                delay,
                reason: format!(
                    "retry attempt {}/{} after {:?}",
                    entry.attempts + 1,
                    entry.max_attempts,
                    delay
                ),
            }
        }
    }
}

/// Audit record of a decision taken for an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub entry_id: EntryId,
    pub dedup_key: String,

    /// What triggered the decision (error, attempt counters).
    pub trigger: serde_json::Value,

    /// Which policy decided.
    pub policy: String,

    /// What was decided (`schedule_retry`, `mark_dead`, `requeue`).
    pub decision: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    #[serde(skip_serializing, skip_deserializing, default = "Instant::now")]
    pub decided_at: Instant,
}

impl DecisionRecord {
    pub fn new(
        entry: &EntryRecord,
        trigger: serde_json::Value,
        policy: impl Into<String>,
        decision: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entry_id: entry.entry_id,
            dedup_key: entry.job.dedup_key(),
            trigger,
            policy: policy.into(),
            decision: decision.into(),
            context,
            decided_at: Instant::now(),
        }
    }
}
