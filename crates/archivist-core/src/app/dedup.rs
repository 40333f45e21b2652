//! Dedup guard: at most one outstanding unit of work per dedup key.
//!
//! Admission takes a per-key token in the shared [`KvStore`] with a TTL equal
//! to the job's expected lifetime. The queue releases the token when the entry
//! is acked or dies. If a token outlives its TTL while the entry is still
//! queued, a second copy may be admitted; downstream writes are idempotent, so
//! that costs a redundant fetch, never a wrong result.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{Job, StoreError};
use crate::ports::KvStore;

#[derive(Clone)]
pub struct DedupGuard {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl DedupGuard {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn token_key(job: &Job) -> String {
        format!("dedup:{}", job.dedup_key())
    }

    /// Take the token for `job`. `false` means the same logical work is
    /// already queued or in flight.
    pub async fn admit(&self, job: &Job) -> Result<bool, StoreError> {
        let admitted = self.kv.set_if_absent(&Self::token_key(job), self.ttl).await?;
        if !admitted {
            debug!(key = %job.dedup_key(), "dedup token held; submission is a no-op");
        }
        Ok(admitted)
    }

    pub async fn release(&self, job: &Job) -> Result<(), StoreError> {
        self.kv.remove(&Self::token_key(job)).await
    }

    pub async fn is_pending(&self, job: &Job) -> Result<bool, StoreError> {
        Ok(self.kv.get(&Self::token_key(job)).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::MemoryKvStore;
    use crate::ports::ManualClock;
    use chrono::{TimeZone, Utc};

    fn guard(ttl: Duration) -> (Arc<ManualClock>, DedupGuard) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let kv = Arc::new(MemoryKvStore::new(clock.clone()));
        (clock, DedupGuard::new(kv, ttl))
    }

    #[tokio::test]
    async fn second_admission_of_same_work_is_refused() {
        let (_clock, guard) = guard(Duration::from_secs(600));
        let job = Job::CrawlArticle {
            lid: "abc12345".into(),
        };

        assert!(guard.admit(&job).await.unwrap());
        assert!(!guard.admit(&job.clone()).await.unwrap());
        assert!(guard.is_pending(&job).await.unwrap());
    }

    #[tokio::test]
    async fn release_and_expiry_both_reopen_admission() {
        let (clock, guard) = guard(Duration::from_secs(600));
        let job = Job::CrawlPaste { id: "p".into() };

        guard.admit(&job).await.unwrap();
        guard.release(&job).await.unwrap();
        assert!(guard.admit(&job).await.unwrap());

        clock.advance(Duration::from_secs(601));
        assert!(!guard.is_pending(&job).await.unwrap());
        assert!(guard.admit(&job).await.unwrap());
    }

    #[tokio::test]
    async fn different_keys_do_not_interfere() {
        let (_clock, guard) = guard(Duration::from_secs(600));
        assert!(guard.admit(&Job::discussion_page(1, 2)).await.unwrap());
        assert!(guard.admit(&Job::discussion_page(1, 3)).await.unwrap());
        assert!(guard.admit(&Job::CrawlDiscussion { id: 1, page: None }).await.unwrap());
    }
}
