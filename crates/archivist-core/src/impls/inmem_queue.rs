//! In-memory, in-process `LaneQueue`.
//!
//! One FIFO ready list per lane plus a shared min-heap of delayed entries.
//! Duplicate submissions are refused through the [`DedupGuard`] token.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::app::dedup::DedupGuard;
use crate::domain::{
    Decider, Decision, DecisionRecord, DefaultDecider, EntryId, EntryRecord, EntryState, Job,
    Lane, QueueError, RetryPolicy,
};
use crate::observability::QueueCounts;
use crate::ports::{
    Admission, Claim, IdGenerator, LaneQueue, Nack, NackOutcome, SystemClock, UlidGenerator,
};

/// Decisions kept for inspection.
const DECISION_LOG_CAPACITY: usize = 1024;

/// Dead entries kept for inspection; older ones are dropped from the record map.
const DEAD_LETTER_CAPACITY: usize = 1024;

/// Delayed entry for the scheduled heap.
///
/// Reverse ordering so `BinaryHeap` acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledEntry {
    next_run_at: Instant,
    entry_id: EntryId,
}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.entry_id.cmp(&self.entry_id))
    }
}

struct QueueState {
    /// All live entries (single source of truth).
    records: HashMap<EntryId, EntryRecord>,

    /// Ready lists, indexed by `Lane::index`.
    ready: [VecDeque<EntryId>; 2],

    /// Delayed re-deliveries of every lane.
    scheduled: BinaryHeap<ScheduledEntry>,

    decisions: VecDeque<DecisionRecord>,

    /// Dead entry ids, oldest first.
    dead_letters: VecDeque<EntryId>,

    completed: usize,
    dead: usize,
}

impl QueueState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            ready: [VecDeque::new(), VecDeque::new()],
            scheduled: BinaryHeap::new(),
            decisions: VecDeque::new(),
            dead_letters: VecDeque::new(),
            completed: 0,
            dead: 0,
        }
    }

    /// Move due entries from the heap to their lane's ready list.
    /// Returns the lanes that received entries.
    fn promote_scheduled(&mut self, now: Instant) -> Vec<Lane> {
        let mut promoted = Vec::new();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.entry_id)
                && record.state == EntryState::RetryScheduled
            {
                record.requeue();
                self.ready[record.lane.index()].push_back(entry.entry_id);
                if !promoted.contains(&record.lane) {
                    promoted.push(record.lane);
                }
            }
        }
        promoted
    }

    fn push_decision(decisions: &mut VecDeque<DecisionRecord>, decision: DecisionRecord) {
        if decisions.len() >= DECISION_LOG_CAPACITY {
            decisions.pop_front();
        }
        decisions.push_back(decision);
    }

    /// Remember a dead entry, evicting the oldest beyond capacity.
    fn bury(&mut self, entry_id: EntryId) {
        self.dead += 1;
        self.dead_letters.push_back(entry_id);
        while self.dead_letters.len() > DEAD_LETTER_CAPACITY {
            if let Some(evicted) = self.dead_letters.pop_front() {
                self.records.remove(&evicted);
            }
        }
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            completed: self.completed,
            dead: self.dead,
            ..QueueCounts::default()
        };
        for record in self.records.values() {
            let lane = counts.lane_mut(record.lane);
            match record.state {
                EntryState::Queued => lane.queued += 1,
                EntryState::Running => lane.running += 1,
                EntryState::RetryScheduled => lane.retry_scheduled += 1,
                EntryState::Dead => {}
            }
        }
        counts
    }
}

pub struct InMemoryLaneQueue {
    state: Arc<Mutex<QueueState>>,
    notify: [Arc<Notify>; 2],
    guard: DedupGuard,
    decider: Arc<dyn Decider>,
    ids: Arc<dyn IdGenerator>,
    max_attempts: u32,
}

impl InMemoryLaneQueue {
    pub fn new(guard: DedupGuard, retry_policy: RetryPolicy) -> Self {
        let max_attempts = retry_policy.max_attempts;
        Self {
            state: Arc::new(Mutex::new(QueueState::new())),
            notify: [Arc::new(Notify::new()), Arc::new(Notify::new())],
            guard,
            decider: Arc::new(DefaultDecider::new(retry_policy)),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            max_attempts,
        }
    }

    pub fn guard(&self) -> &DedupGuard {
        &self.guard
    }

    /// Recent retry/requeue/dead decisions, oldest first.
    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.state.lock().await.decisions.iter().cloned().collect()
    }

    /// Entries given up on.
    pub async fn dead_letters(&self) -> Vec<EntryRecord> {
        let state = self.state.lock().await;
        let mut dead: Vec<EntryRecord> = state
            .records
            .values()
            .filter(|record| record.state == EntryState::Dead)
            .cloned()
            .collect();
        dead.sort_by_key(|record| record.entry_id);
        dead
    }

    /// Live (non-dead) entries, oldest first.
    pub async fn outstanding(&self) -> Vec<EntryRecord> {
        let state = self.state.lock().await;
        let mut live: Vec<EntryRecord> = state
            .records
            .values()
            .filter(|record| record.state.is_outstanding())
            .cloned()
            .collect();
        live.sort_by_key(|record| record.entry_id);
        live
    }

    fn wake(&self, lane: Lane) {
        self.notify[lane.index()].notify_one();
    }
}

#[async_trait]
impl LaneQueue for InMemoryLaneQueue {
    async fn submit(&self, job: Job, lane: Lane) -> Result<Admission, QueueError> {
        if !self.guard.admit(&job).await? {
            return Ok(Admission::AlreadyPending);
        }

        let entry_id = self.ids.generate_entry_id();
        debug!(key = %job.dedup_key(), %lane, %entry_id, "entry queued");
        {
            let mut state = self.state.lock().await;
            let record = EntryRecord::new(entry_id, job, lane, self.max_attempts);
            state.records.insert(entry_id, record);
            state.ready[lane.index()].push_back(entry_id);
        }
        self.wake(lane);

        Ok(Admission::Accepted(entry_id))
    }

    async fn claim(&self, lane: Lane, wait: Duration) -> Result<Option<Claim>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let (claim, promoted, next_wake) = {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                let promoted = state.promote_scheduled(Instant::now());

                let mut claim = None;
                while let Some(entry_id) = state.ready[lane.index()].pop_front() {
                    if let Some(record) = state.records.get_mut(&entry_id)
                        && record.state == EntryState::Queued
                    {
                        record.start_attempt();
                        claim = Some(Claim {
                            entry_id,
                            job: record.job.clone(),
                            lane: record.lane,
                            attempt: record.attempts,
                        });
                        break;
                    }
                }

                let next_wake = state.scheduled.peek().map(|entry| entry.next_run_at);
                (claim, promoted, next_wake)
            };

            // 他レーンの待機ワーカーも起こす（ロック外で通知）
            for other in promoted.into_iter().filter(|other| *other != lane) {
                self.wake(other);
            }

            if claim.is_some() {
                return Ok(claim);
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let wake_at = next_wake.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = self.notify[lane.index()].notified() => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn ack(&self, entry_id: EntryId) -> Result<(), QueueError> {
        let record = {
            let mut state = self.state.lock().await;
            match state.records.get(&entry_id) {
                None => return Err(QueueError::UnknownEntry(entry_id.to_string())),
                Some(record) if record.state != EntryState::Running => {
                    return Err(QueueError::NotRunning {
                        entry: entry_id.to_string(),
                    });
                }
                Some(_) => {}
            }
            state.completed += 1;
            state.records.remove(&entry_id)
        };

        if let Some(record) = record {
            self.guard.release(&record.job).await?;
        }
        Ok(())
    }

    async fn nack(&self, entry_id: EntryId, nack: Nack) -> Result<NackOutcome, QueueError> {
        let (outcome, released, wake_lane) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(record) = state.records.get_mut(&entry_id) else {
                return Err(QueueError::UnknownEntry(entry_id.to_string()));
            };
            if record.state != EntryState::Running {
                return Err(QueueError::NotRunning {
                    entry: entry_id.to_string(),
                });
            }
            let lane = record.lane;

            let settled = match nack {
                Nack::Requeue { delay } => {
                    record.refund_attempt();
                    let decision = DecisionRecord::new(
                        record,
                        serde_json::json!({ "attempts": record.attempts }),
                        "rate_limit",
                        "requeue",
                        Some(serde_json::json!({ "delay_ms": delay.as_millis() as u64 })),
                    );
                    if delay.is_zero() {
                        record.requeue();
                        state.ready[lane.index()].push_back(entry_id);
                    } else {
                        let next_run_at = Instant::now() + delay;
                        record.schedule_retry(next_run_at, None);
                        state.scheduled.push(ScheduledEntry {
                            next_run_at,
                            entry_id,
                        });
                    }
                    QueueState::push_decision(&mut state.decisions, decision);
                    (NackOutcome::Requeued, None, Some(lane))
                }
                Nack::Failed { error: err } => {
                    let trigger = serde_json::json!({
                        "error": err,
                        "attempts": record.attempts,
                        "max_attempts": record.max_attempts,
                    });
                    match self.decider.decide(record) {
                        Decision::Retry { delay, reason } => {
                            let next_run_at = Instant::now() + delay;
                            let decision = DecisionRecord::new(
                                record,
                                trigger,
                                "retry_policy",
                                "schedule_retry",
                                Some(serde_json::json!({
                                    "delay_ms": delay.as_millis() as u64,
                                    "reason": reason,
                                })),
                            );
                            record.schedule_retry(next_run_at, Some(err));
                            state.scheduled.push(ScheduledEntry {
                                next_run_at,
                                entry_id,
                            });
                            QueueState::push_decision(&mut state.decisions, decision);
                            let attempt = record.attempts;
                            (NackOutcome::RetryScheduled { attempt, delay }, None, Some(lane))
                        }
                        Decision::MarkDead { reason } => {
                            let decision = DecisionRecord::new(
                                record,
                                trigger,
                                "retry_policy",
                                "mark_dead",
                                Some(serde_json::json!({ "reason": reason })),
                            );
                            error!(key = %record.job.dedup_key(), attempts = record.attempts, error = %err, "retries exhausted; entry is dead");
                            record.mark_dead(err);
                            QueueState::push_decision(&mut state.decisions, decision);
                            let attempts = record.attempts;
                            (NackOutcome::Dead { attempts }, Some(record.job.clone()), None)
                        }
                    }
                }
                Nack::Fatal { error: err } => {
                    let decision = DecisionRecord::new(
                        record,
                        serde_json::json!({ "error": err, "attempts": record.attempts }),
                        "fatal",
                        "mark_dead",
                        None,
                    );
                    record.mark_dead(err);
                    QueueState::push_decision(&mut state.decisions, decision);
                    let attempts = record.attempts;
                    (NackOutcome::Dead { attempts }, Some(record.job.clone()), None)
                }
            };
            if settled.1.is_some() {
                state.bury(entry_id);
            }
            settled
        };

        if let Some(job) = released {
            if let Err(err) = self.guard.release(&job).await {
                // トークンは TTL で自然に消えるので、ここでは記録だけ
                warn!(key = %job.dedup_key(), error = %err, "failed to release dedup token of dead entry");
            }
        }
        if let Some(lane) = wake_lane {
            self.wake(lane);
        }
        Ok(outcome)
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        Ok(self.state.lock().await.counts())
    }
}
