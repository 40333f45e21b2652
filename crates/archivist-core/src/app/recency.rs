//! Recency cache: "this discussion was recently confirmed to have no new
//! replies up to page N".
//!
//! One marker per discussion holding the highest such page. Writes are
//! monotonic (a lower page never replaces a higher one while the marker is
//! live). Losing a marker only costs extra fetches.
//!
//! A second marker remembers the reply count a listing last showed for a
//! discussion, so listings only re-discover threads that changed.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::domain::{DiscussionId, StoreError};
use crate::ports::KvStore;

#[derive(Clone)]
pub struct RecencyCache {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl RecencyCache {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn marker_key(id: DiscussionId) -> String {
        format!("recency:discuss:{id}")
    }

    fn listed_key(id: DiscussionId) -> String {
        format!("recency:listed:{id}")
    }

    /// Record `page` as confirmed empty with the default freshness window.
    /// Returns the highest page recorded afterwards.
    pub async fn mark_empty(&self, id: DiscussionId, page: u32) -> Result<u32, StoreError> {
        self.mark_empty_for(id, page, self.ttl).await
    }

    pub async fn mark_empty_for(
        &self,
        id: DiscussionId,
        page: u32,
        ttl: Duration,
    ) -> Result<u32, StoreError> {
        let stored = self
            .kv
            .set_max(&Self::marker_key(id), u64::from(page), ttl)
            .await?;
        trace!(discussion = id, page, highest = stored, "recency marker written");
        Ok(u32::try_from(stored).unwrap_or(u32::MAX))
    }

    /// Highest page recently confirmed empty, if a marker is live.
    pub async fn highest_empty(&self, id: DiscussionId) -> Result<Option<u32>, StoreError> {
        Ok(self
            .kv
            .get(&Self::marker_key(id))
            .await?
            .map(|page| u32::try_from(page).unwrap_or(u32::MAX)))
    }

    pub async fn is_recently_empty(&self, id: DiscussionId, page: u32) -> Result<bool, StoreError> {
        Ok(self
            .highest_empty(id)
            .await?
            .is_some_and(|highest| highest >= page))
    }

    /// Record the reply count a listing just showed for `id` and return the
    /// count recorded before, if a live one existed.
    pub async fn observe_listed(
        &self,
        id: DiscussionId,
        reply_count: u32,
    ) -> Result<Option<u32>, StoreError> {
        let key = Self::listed_key(id);
        let previous = self.kv.get(&key).await?;
        self.kv.set_max(&key, u64::from(reply_count), self.ttl).await?;
        Ok(previous.map(|count| u32::try_from(count).unwrap_or(u32::MAX)))
    }
}
