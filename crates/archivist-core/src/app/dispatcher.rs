//! Dispatcher: execute one claimed job against the crawler, derive its
//! follow-ups, and settle the entry with the queue.
//!
//! This is the only place a job's execution result is interpreted. Crawl
//! failures never escape `process`; only queue failures do. A panicking
//! crawler is settled as a fatal failure of that one entry.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, trace, warn};

use crate::app::pagination::{self, DiscussionStep};
use crate::app::recency::RecencyCache;
use crate::app::{replies, router};
use crate::domain::{
    CrawlError, DiscussionId, DispatchOutcome, Disposition, FollowUp, Job, Lane, QueueError,
    classify,
};
use crate::ports::{Claim, Crawler, LaneQueue, Nack, NackOutcome};

pub struct Dispatcher {
    crawler: Arc<dyn Crawler>,
    queue: Arc<dyn LaneQueue>,
    recency: RecencyCache,
}

impl Dispatcher {
    pub fn new(crawler: Arc<dyn Crawler>, queue: Arc<dyn LaneQueue>, recency: RecencyCache) -> Self {
        Self {
            crawler,
            queue,
            recency,
        }
    }

    pub fn queue(&self) -> &Arc<dyn LaneQueue> {
        &self.queue
    }

    /// Claim one entry of `lane` (waiting up to `wait`) and process it.
    pub async fn run_once(
        &self,
        lane: Lane,
        wait: Duration,
    ) -> Result<Option<DispatchOutcome>, QueueError> {
        match self.queue.claim(lane, wait).await? {
            Some(claim) => self.process(claim).await.map(Some),
            None => Ok(None),
        }
    }

    /// Execute a claimed job and ack/nack it according to the result.
    pub async fn process(&self, claim: Claim) -> Result<DispatchOutcome, QueueError> {
        let key = claim.job.dedup_key();
        debug!(%key, lane = %claim.lane, attempt = claim.attempt, "executing");

        let executed = AssertUnwindSafe(self.execute(&claim.job, claim.lane))
            .catch_unwind()
            .await;
        let err = match executed {
            Ok(Ok(follow_ups)) => match self.emit(&follow_ups).await {
                Ok(admitted) => {
                    self.queue.ack(claim.entry_id).await?;
                    return Ok(DispatchOutcome::Completed {
                        follow_ups: follow_ups.len(),
                        admitted,
                    });
                }
                // follow-up を出し切れなかったジョブは完了扱いにしない
                Err(err) => CrawlError::Transient(format!("follow-up submission failed: {err}")),
            },
            Ok(Err(err)) => err,
            Err(panic) => CrawlError::Fatal(format!(
                "crawler panicked: {}",
                panic_message(panic.as_ref())
            )),
        };

        match classify(&err) {
            Disposition::Retire => {
                warn!(%key, error = %err, "content unavailable; retiring job");
                self.queue.ack(claim.entry_id).await?;
                Ok(DispatchOutcome::Dropped {
                    reason: err.to_string(),
                })
            }
            Disposition::SleepThenRedeliver(delay) => {
                warn!(%key, delay_ms = delay.as_millis() as u64, "rate limited; backing off before re-delivery");
                tokio::time::sleep(delay).await;
                self.queue
                    .nack(
                        claim.entry_id,
                        Nack::Requeue {
                            delay: Duration::ZERO,
                        },
                    )
                    .await?;
                Ok(DispatchOutcome::Requeued { slept: delay })
            }
            Disposition::Backoff => {
                error!(%key, attempt = claim.attempt, error = %err, "transient crawl failure");
                let outcome = self
                    .queue
                    .nack(
                        claim.entry_id,
                        Nack::Failed {
                            error: err.to_string(),
                        },
                    )
                    .await?;
                Ok(match outcome {
                    NackOutcome::RetryScheduled { attempt, delay } => {
                        DispatchOutcome::RetryScheduled { attempt, delay }
                    }
                    NackOutcome::Dead { .. } => DispatchOutcome::Dead {
                        reason: err.to_string(),
                    },
                    NackOutcome::Requeued => DispatchOutcome::Requeued {
                        slept: Duration::ZERO,
                    },
                })
            }
            Disposition::Fatal => {
                error!(%key, error = %err, "fatal crawl failure; not retrying");
                self.queue
                    .nack(
                        claim.entry_id,
                        Nack::Fatal {
                            error: err.to_string(),
                        },
                    )
                    .await?;
                Ok(DispatchOutcome::Dead {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Run the crawl action for `job` and return the follow-ups it produces.
    pub async fn execute(&self, job: &Job, lane: Lane) -> Result<Vec<FollowUp>, CrawlError> {
        match job {
            Job::ListDiscussions { forum, page } => {
                let listed = self.crawler.list_discussions(forum.as_deref(), *page).await?;
                let mut follow_ups = Vec::with_capacity(listed.len());
                for item in listed {
                    let previous = self.recency.observe_listed(item.id, item.reply_count).await?;
                    match router::route_listed(previous, item.reply_count) {
                        Some(lane) => follow_ups.push(FollowUp::new(
                            Job::CrawlDiscussion {
                                id: item.id,
                                page: None,
                            },
                            lane,
                        )),
                        None => trace!(discussion = item.id, "listed thread unchanged"),
                    }
                }
                Ok(follow_ups)
            }
            Job::ListArticles { collection, page } => {
                let listed = self
                    .crawler
                    .list_articles(collection.as_deref(), *page)
                    .await?;
                Ok(listed
                    .into_iter()
                    .map(|lid| FollowUp::new(Job::CrawlArticle { lid }, router::route_discovered()))
                    .collect())
            }
            Job::CrawlDiscussion { id, page } => {
                self.crawl_discussion(*id, DiscussionStep::from_page(*page), lane)
                    .await
            }
            Job::CrawlArticle { lid } => {
                self.crawler.fetch_article(lid).await?;
                Ok(vec![replies::chain_head(lid, lane)])
            }
            Job::CrawlArticleReplies { lid, after } => {
                let observed = self.crawler.fetch_article_replies(lid, *after).await?;
                Ok(replies::next_link(lid, lane, &observed).into_iter().collect())
            }
            Job::CrawlPaste { id } => {
                self.crawler.fetch_paste(id).await?;
                Ok(Vec::new())
            }
            Job::CrawlJudgement => {
                self.crawler.fetch_judgement_log().await?;
                Ok(Vec::new())
            }
        }
    }

    async fn crawl_discussion(
        &self,
        id: DiscussionId,
        step: DiscussionStep,
        lane: Lane,
    ) -> Result<Vec<FollowUp>, CrawlError> {
        let page = match step {
            DiscussionStep::Discover => {
                let observed = self.crawler.fetch_discussion_page(id, None).await?;
                return Ok(pagination::fan_out(id, &observed));
            }
            DiscussionStep::Page(page) => page,
        };

        let observed = self.crawler.fetch_discussion_page(id, Some(page)).await?;

        // 自分のページを記録する前に n-1 を問い合わせる
        let previous_recently_empty = if pagination::needs_recency_check(page, lane) {
            self.recency.is_recently_empty(id, page - 1).await?
        } else {
            false
        };

        let plan = pagination::plan_page(id, page, lane, &observed, previous_recently_empty);
        if plan.mark_empty {
            self.recency.mark_empty(id, page).await?;
        }
        if previous_recently_empty {
            debug!(discussion = id, page, "previous page recently empty; walk pruned");
        }
        Ok(plan.follow_ups)
    }

    /// Offer follow-ups to the queue. Returns how many were newly admitted.
    async fn emit(&self, follow_ups: &[FollowUp]) -> Result<usize, QueueError> {
        let mut admitted = 0;
        for follow_up in follow_ups {
            let admission = self
                .queue
                .submit(follow_up.job.clone(), follow_up.lane)
                .await?;
            if admission.is_accepted() {
                admitted += 1;
            }
            debug!(
                key = %follow_up.job.dedup_key(),
                lane = %follow_up.lane,
                accepted = admission.is_accepted(),
                "follow-up emitted"
            );
        }
        if !follow_ups.is_empty() {
            info!(emitted = follow_ups.len(), admitted, "follow-ups submitted");
        }
        Ok(admitted)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dedup::DedupGuard;
    use crate::domain::{DiscussionPage, ListedDiscussion, ReplyPage, RetryPolicy};
    use crate::impls::{InMemoryLaneQueue, MemoryKvStore};
    use crate::ports::KvStore;
    use crate::testing::ScriptedCrawler;

    struct Harness {
        crawler: Arc<ScriptedCrawler>,
        queue: Arc<InMemoryLaneQueue>,
        recency: RecencyCache,
        dispatcher: Dispatcher,
    }

    fn harness() -> Harness {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let guard = DedupGuard::new(kv.clone(), Duration::from_secs(3600));
        let queue = Arc::new(InMemoryLaneQueue::new(
            guard,
            RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
        ));
        let recency = RecencyCache::new(kv, Duration::from_secs(600));
        let crawler = Arc::new(ScriptedCrawler::new());
        let dispatcher = Dispatcher::new(crawler.clone(), queue.clone(), recency.clone());
        Harness {
            crawler,
            queue,
            recency,
            dispatcher,
        }
    }

    fn discussion(num_pages: u32, num_replies: u32, num_new_replies: u32) -> DiscussionPage {
        DiscussionPage {
            num_pages,
            num_replies,
            num_new_replies,
            most_recent_reply_captured: true,
        }
    }

    #[tokio::test]
    async fn listing_discovers_threads_on_immediate() {
        let h = harness();
        let listing = Job::ListDiscussions {
            forum: None,
            page: Some(3),
        };
        h.crawler.script_listing(
            &listing,
            vec![
                ListedDiscussion {
                    id: 1,
                    reply_count: 4,
                },
                ListedDiscussion {
                    id: 2,
                    reply_count: 0,
                },
            ],
        );

        let follow_ups = h.dispatcher.execute(&listing, Lane::Routine).await.unwrap();
        assert_eq!(
            follow_ups,
            vec![
                FollowUp::new(Job::CrawlDiscussion { id: 1, page: None }, Lane::Immediate),
                FollowUp::new(Job::CrawlDiscussion { id: 2, page: None }, Lane::Immediate),
            ]
        );
    }

    #[tokio::test]
    async fn listing_rediscovers_only_threads_with_new_replies() {
        let h = harness();
        let listing = Job::ListDiscussions {
            forum: None,
            page: Some(1),
        };
        let listed = |first: u32, second: u32| {
            vec![
                ListedDiscussion {
                    id: 1,
                    reply_count: first,
                },
                ListedDiscussion {
                    id: 2,
                    reply_count: second,
                },
            ]
        };
        h.crawler.script_listing(&listing, listed(4, 0));
        h.crawler.script_listing(&listing, listed(4, 3));

        assert_eq!(
            h.dispatcher.execute(&listing, Lane::Immediate).await.unwrap().len(),
            2
        );
        let follow_ups = h.dispatcher.execute(&listing, Lane::Immediate).await.unwrap();
        assert_eq!(
            follow_ups,
            vec![FollowUp::new(
                Job::CrawlDiscussion { id: 2, page: None },
                Lane::Immediate
            )]
        );
    }

    #[tokio::test]
    async fn article_starts_reply_chain_on_inherited_lane() {
        let h = harness();
        let follow_ups = h
            .dispatcher
            .execute(&Job::CrawlArticle { lid: "abc".into() }, Lane::Routine)
            .await
            .unwrap();
        assert_eq!(
            follow_ups,
            vec![FollowUp::new(
                Job::CrawlArticleReplies {
                    lid: "abc".into(),
                    after: None
                },
                Lane::Routine
            )]
        );
    }

    #[tokio::test]
    async fn empty_routine_page_marks_recency_after_checking_previous() {
        let h = harness();
        let job = Job::discussion_page(9, 5);
        h.crawler.script_discussion(&job, discussion(5, 10, 0));

        let follow_ups = h.dispatcher.execute(&job, Lane::Routine).await.unwrap();
        assert_eq!(
            follow_ups,
            vec![FollowUp::new(Job::discussion_page(9, 4), Lane::Routine)]
        );
        assert_eq!(h.recency.highest_empty(9).await.unwrap(), Some(5));

        // 次の Routine ページは刈り込まれる
        let next = Job::discussion_page(9, 4);
        h.crawler.script_discussion(&next, discussion(5, 10, 0));
        let follow_ups = h.dispatcher.execute(&next, Lane::Routine).await.unwrap();
        assert!(follow_ups.is_empty());
    }

    #[tokio::test]
    async fn crawler_panic_kills_only_that_entry() {
        let h = harness();
        let job = Job::CrawlPaste { id: "boom".into() };
        h.crawler.script_panic(&job, "parser bug");
        h.queue.submit(job.clone(), Lane::Immediate).await.unwrap();

        let outcome = h
            .dispatcher
            .run_once(Lane::Immediate, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert!(
            matches!(&outcome, DispatchOutcome::Dead { reason } if reason.contains("parser bug")),
            "{outcome:?}"
        );

        let counts = h.queue.counts().await.unwrap();
        assert_eq!(counts.outstanding(), 0);
        assert_eq!(counts.dead, 1);
        let dead = h.queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 1);

        // token released: the key can be submitted again right away
        assert!(h.queue.submit(job, Lane::Immediate).await.unwrap().is_accepted());
    }

    #[tokio::test]
    async fn access_denied_retires_without_retry() {
        let h = harness();
        let job = Job::CrawlPaste { id: "gone".into() };
        h.crawler
            .script_failure(&job, CrawlError::AccessDenied("404".into()));
        h.queue.submit(job.clone(), Lane::Immediate).await.unwrap();

        let outcome = h
            .dispatcher
            .run_once(Lane::Immediate, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Dropped { .. }));
        let counts = h.queue.counts().await.unwrap();
        assert_eq!(counts.outstanding(), 0);
        assert_eq!(counts.dead, 0);
        assert!(!h.queue.guard().is_pending(&job).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_then_die() {
        let h = harness();
        let job = Job::CrawlJudgement;
        h.crawler
            .script_failure(&job, CrawlError::Transient("502".into()));
        h.crawler
            .script_failure(&job, CrawlError::Transient("502".into()));
        h.queue.submit(job.clone(), Lane::Immediate).await.unwrap();

        let first = h
            .dispatcher
            .run_once(Lane::Immediate, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            first,
            DispatchOutcome::RetryScheduled {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );

        let second = h
            .dispatcher
            .run_once(Lane::Immediate, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, DispatchOutcome::Dead { .. }));
        assert_eq!(h.queue.dead_letters().await.len(), 1);
    }

    #[tokio::test]
    async fn fatal_failures_are_never_retried() {
        let h = harness();
        let job = Job::CrawlPaste { id: "p1".into() };
        h.crawler.script_failure(&job, CrawlError::Fatal("bug".into()));
        h.queue.submit(job, Lane::Routine).await.unwrap();

        let outcome = h
            .dispatcher
            .run_once(Lane::Routine, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dead { .. }));
        assert_eq!(h.queue.counts().await.unwrap().dead, 1);
    }

    #[tokio::test]
    async fn reply_chain_terminates_on_empty_page() {
        let h = harness();
        let job = Job::CrawlArticleReplies {
            lid: "abc".into(),
            after: None,
        };
        h.crawler.script_replies(&job, ReplyPage::empty());
        h.queue.submit(job, Lane::Immediate).await.unwrap();

        let outcome = h
            .dispatcher
            .run_once(Lane::Immediate, Duration::ZERO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Completed {
                follow_ups: 0,
                admitted: 0
            }
        );
    }

    #[tokio::test]
    async fn nothing_to_claim_returns_none() {
        let h = harness();
        let outcome = h
            .dispatcher
            .run_once(Lane::Routine, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(outcome, None);
    }
}
