//! Entry record: one submitted job plus its delivery bookkeeping.

use tokio::time::Instant;

use super::ids::EntryId;
use super::job::Job;
use super::lane::Lane;
use super::state::EntryState;

/// Single source of truth for a queued entry.
///
/// Ready/scheduled structures hold `EntryId`s only; every state transition
/// goes through the methods below.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub entry_id: EntryId,
    pub job: Job,
    pub lane: Lane,
    pub state: EntryState,

    /// Attempts charged so far (including the current one while Running).
    pub attempts: u32,

    pub max_attempts: u32,

    pub last_error: Option<String>,

    /// When a RetryScheduled entry becomes ready again.
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl EntryRecord {
    pub fn new(entry_id: EntryId, job: Job, lane: Lane, max_attempts: u32) -> Self {
        let now = Instant::now();
        Self {
            entry_id,
            job,
            lane,
            state: EntryState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as running (charge one attempt).
    pub fn start_attempt(&mut self) {
        self.state = EntryState::Running;
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    /// Give back the attempt charged by the current claim.
    pub fn refund_attempt(&mut self) {
        self.attempts = self.attempts.saturating_sub(1);
        self.updated_at = Instant::now();
    }

    pub fn mark_dead(&mut self, error: String) {
        self.state = EntryState::Dead;
        self.last_error = Some(error);
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }

    pub fn schedule_retry(&mut self, next_run_at: Instant, error: Option<String>) {
        self.state = EntryState::RetryScheduled;
        self.next_run_at = Some(next_run_at);
        if error.is_some() {
            self.last_error = error;
        }
        self.updated_at = Instant::now();
    }

    /// Move back to Queued.
    pub fn requeue(&mut self) {
        self.state = EntryState::Queued;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn record() -> EntryRecord {
        EntryRecord::new(
            EntryId::from_ulid(Ulid::new()),
            Job::CrawlJudgement,
            Lane::Immediate,
            3,
        )
    }

    #[test]
    fn refund_undoes_the_charge_of_a_claim() {
        let mut rec = record();
        rec.start_attempt();
        assert_eq!(rec.attempts, 1);
        assert_eq!(rec.state, EntryState::Running);

        rec.refund_attempt();
        rec.requeue();
        assert_eq!(rec.attempts, 0);
        assert_eq!(rec.state, EntryState::Queued);
    }

    #[test]
    fn retry_keeps_previous_error_when_none_given() {
        let mut rec = record();
        rec.start_attempt();
        rec.schedule_retry(Instant::now(), Some("502".into()));
        rec.schedule_retry(Instant::now(), None);
        assert_eq!(rec.last_error.as_deref(), Some("502"));
        assert_eq!(rec.state, EntryState::RetryScheduled);
    }
}
