//! LaneQueue port - レーン分割された配送キュー
//!
//! 優先度キュー版・ストリーム版のどちらでも同じスケジューリング契約を満たすための
//! 抽象です。実装は 1 つ（InMemoryLaneQueue）だけを持ち、外部ブローカー版を足す
//! ときもこの trait を実装します。
//!
//! # 契約
//! - `submit`: dedup key が既に queued / in-flight なら no-op（AlreadyPending）
//! - `claim`: レーンごとに取り出す（レーン同士は独立）
//! - `ack`: 完了。エントリを消して dedup トークンを解放
//! - `nack`: 遅延付きの再配送 / バックオフ付きリトライ / dead

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{EntryId, Job, Lane, QueueError};
use crate::observability::QueueCounts;

/// Result of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "admission", content = "entry_id", rename_all = "snake_case")]
pub enum Admission {
    Accepted(EntryId),
    AlreadyPending,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// A claimed entry. The worker must `ack` or `nack` it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub entry_id: EntryId,
    pub job: Job,
    pub lane: Lane,

    /// 1-indexed attempt this claim represents.
    pub attempt: u32,
}

/// Why an entry is handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nack {
    /// Re-deliver the same entry after `delay` without charging an attempt.
    Requeue { delay: Duration },

    /// Charge the attempt; the queue decides between backoff retry and death.
    Failed { error: String },

    /// Never retry.
    Fatal { error: String },
}

/// What the queue did with a nacked entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    Requeued,
    RetryScheduled { attempt: u32, delay: Duration },
    Dead { attempts: u32 },
}

#[async_trait]
pub trait LaneQueue: Send + Sync {
    /// Offer a job on a lane.
    async fn submit(&self, job: Job, lane: Lane) -> Result<Admission, QueueError>;

    /// Claim one ready entry of `lane`, waiting up to `wait` (zero = don't wait).
    async fn claim(&self, lane: Lane, wait: Duration) -> Result<Option<Claim>, QueueError>;

    async fn ack(&self, entry_id: EntryId) -> Result<(), QueueError>;

    async fn nack(&self, entry_id: EntryId, nack: Nack) -> Result<NackOutcome, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}
