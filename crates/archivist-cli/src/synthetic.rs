//! Synthetic forum: answers crawl calls with random but plausible
//! observations, so the scheduler can be exercised without a network.

use std::time::Duration;

use archivist_core::domain::{
    CrawlError, DiscussionId, DiscussionPage, ListedDiscussion, ReplyId, ReplyPage, RetryPolicy,
};
use archivist_core::ports::Crawler;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

/// Threads per listing page.
const LISTING_SIZE: u64 = 8;

/// Replies per discussion page.
const REPLIES_PER_PAGE: u32 = 20;

pub struct SyntheticForum {
    /// Fetch latency.
    latency: Duration,

    /// Probability that a fetch is rate limited.
    rate_limit_rate: f64,

    /// Probability that a fetch fails transiently.
    failure_rate: f64,

    retry: RetryPolicy,
}

impl SyntheticForum {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            latency: Duration::from_millis(50),
            rate_limit_rate: 0.02,
            failure_rate: 0.03,
            retry,
        }
    }

    /// Latency, then maybe an injected failure.
    async fn round_trip(&self) -> Result<(), CrawlError> {
        tokio::time::sleep(self.latency).await;
        let roll: f64 = rand::thread_rng().r#gen();
        if roll < self.rate_limit_rate {
            let header = if rand::thread_rng().gen_bool(0.5) { "2" } else { "garbled" };
            return Err(CrawlError::RateLimited {
                retry_after: self.retry.retry_after(Some(header), Utc::now()),
            });
        }
        if roll < self.rate_limit_rate + self.failure_rate {
            return Err(CrawlError::Transient("synthetic 503".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Crawler for SyntheticForum {
    async fn fetch_discussion_page(
        &self,
        id: DiscussionId,
        page: Option<u32>,
    ) -> Result<DiscussionPage, CrawlError> {
        self.round_trip().await?;
        if id % 97 == 0 {
            return Err(CrawlError::AccessDenied(format!("discussion {id} removed")));
        }

        let num_pages = (id % 5) as u32 + 1;
        let mut rng = rand::thread_rng();
        let num_replies = match page {
            Some(p) if p < num_pages => REPLIES_PER_PAGE,
            _ => rng.gen_range(1..=REPLIES_PER_PAGE),
        };
        let num_new_replies = match page {
            // newest page is where replies land
            Some(p) if p == num_pages => rng.gen_range(0..=num_replies),
            _ => rng.gen_range(0..=num_replies / 4),
        };
        Ok(DiscussionPage {
            num_pages,
            num_replies,
            num_new_replies,
            most_recent_reply_captured: rng.gen_bool(0.9),
        })
    }

    async fn fetch_article(&self, _lid: &str) -> Result<(), CrawlError> {
        self.round_trip().await
    }

    async fn fetch_article_replies(
        &self,
        _lid: &str,
        after: Option<ReplyId>,
    ) -> Result<ReplyPage, CrawlError> {
        self.round_trip().await?;
        let cursor = after.unwrap_or(1_000);
        if cursor < 100 {
            return Ok(ReplyPage::empty());
        }
        let mut rng = rand::thread_rng();
        Ok(ReplyPage {
            last_reply_id: Some(cursor - rng.gen_range(50..=400).min(cursor)),
            last_reply_saved: rng.gen_bool(0.4),
        })
    }

    async fn fetch_paste(&self, _id: &str) -> Result<(), CrawlError> {
        self.round_trip().await
    }

    async fn fetch_judgement_log(&self) -> Result<(), CrawlError> {
        self.round_trip().await
    }

    async fn list_discussions(
        &self,
        _forum: Option<&str>,
        page: Option<u32>,
    ) -> Result<Vec<ListedDiscussion>, CrawlError> {
        self.round_trip().await?;
        let first = u64::from(page.unwrap_or(1)).saturating_sub(1) * LISTING_SIZE + 1;
        let mut rng = rand::thread_rng();
        Ok((first..first + LISTING_SIZE)
            .map(|id| ListedDiscussion {
                id,
                reply_count: rng.gen_range(0..200),
            })
            .collect())
    }

    async fn list_articles(
        &self,
        _collection: Option<&str>,
        page: Option<u32>,
    ) -> Result<Vec<String>, CrawlError> {
        self.round_trip().await?;
        let page = page.unwrap_or(1);
        Ok((0..4).map(|i| format!("a{page:03}{i:02}")).collect())
    }
}
