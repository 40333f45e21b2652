use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::app::dispatcher::Dispatcher;
use crate::domain::Lane;

/// Per-lane concurrency budget.
///
/// Each lane gets its own workers, so a deep `Routine` backlog never starves
/// `Immediate` work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerBudget {
    pub immediate: usize,
    pub routine: usize,

    /// How long an idle worker waits for an entry before re-checking shutdown.
    pub poll_interval: Duration,
}

impl WorkerBudget {
    pub fn for_lane(&self, lane: Lane) -> usize {
        match lane {
            Lane::Immediate => self.immediate,
            Lane::Routine => self.routine,
        }
    }
}

impl Default for WorkerBudget {
    fn default() -> Self {
        Self {
            immediate: 4,
            routine: 2,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Worker group handle.
/// - `request_shutdown` で新しい claim を止める（実行中のジョブは最後まで走る）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn the budgeted workers of both lanes.
    pub fn spawn(budget: WorkerBudget, dispatcher: Arc<Dispatcher>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(budget.immediate + budget.routine);
        for lane in Lane::ALL {
            for worker_id in 0..budget.for_lane(lane) {
                let dispatcher = Arc::clone(&dispatcher);
                let mut rx = shutdown_rx.clone();
                let poll_interval = budget.poll_interval;

                joins.push(tokio::spawn(async move {
                    worker_loop(lane, worker_id, dispatcher, poll_interval, &mut rx).await;
                }));
            }
        }
        info!(
            immediate = budget.immediate,
            routine = budget.routine,
            "workers started"
        );

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new claims. In-flight jobs are not cancelled.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(err) = j.await {
                error!(error = %err, "worker task panicked");
            }
        }
        info!("workers stopped");
    }
}

async fn worker_loop(
    lane: Lane,
    worker_id: usize,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // claim だけを shutdown と競合させる。実行は select の外。
        let claim = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            claim = dispatcher.queue().claim(lane, poll_interval) => claim,
        };

        let claim = match claim {
            Ok(Some(claim)) => claim,
            Ok(None) => continue,
            Err(err) => {
                error!(%lane, worker_id, error = %err, "claim failed");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        let key = claim.job.dedup_key();
        match dispatcher.process(claim).await {
            Ok(outcome) => debug!(%lane, worker_id, %key, ?outcome, "job settled"),
            Err(err) => error!(%lane, worker_id, %key, error = %err, "failed to settle job"),
        }
    }
    debug!(%lane, worker_id, "worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dedup::DedupGuard;
    use crate::app::recency::RecencyCache;
    use crate::domain::{DiscussionPage, Job, RetryPolicy};
    use crate::impls::{InMemoryLaneQueue, MemoryKvStore};
    use crate::ports::{KvStore, LaneQueue};
    use crate::testing::ScriptedCrawler;

    #[tokio::test(start_paused = true)]
    async fn workers_drain_both_lanes_and_stop() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let queue = Arc::new(InMemoryLaneQueue::new(
            DedupGuard::new(kv.clone(), Duration::from_secs(3600)),
            RetryPolicy::default(),
        ));
        let crawler = Arc::new(ScriptedCrawler::new());
        crawler.script_discussion(
            &Job::CrawlDiscussion { id: 3, page: None },
            DiscussionPage {
                num_pages: 2,
                num_replies: 0,
                num_new_replies: 0,
                most_recent_reply_captured: true,
            },
        );
        for page in 1..=2 {
            crawler.script_discussion(
                &Job::discussion_page(3, page),
                DiscussionPage {
                    num_pages: 2,
                    num_replies: 4,
                    num_new_replies: 4,
                    most_recent_reply_captured: true,
                },
            );
        }
        let dispatcher = Arc::new(Dispatcher::new(
            crawler.clone(),
            queue.clone(),
            RecencyCache::new(kv, Duration::from_secs(600)),
        ));

        queue
            .submit(Job::CrawlDiscussion { id: 3, page: None }, Lane::Immediate)
            .await
            .unwrap();
        queue.submit(Job::CrawlJudgement, Lane::Routine).await.unwrap();

        let group = WorkerGroup::spawn(
            WorkerBudget {
                immediate: 1,
                routine: 1,
                poll_interval: Duration::from_millis(50),
            },
            dispatcher,
        );
        assert_eq!(group.len(), 2);

        for _ in 0..100 {
            let counts = queue.counts().await.unwrap();
            if counts.completed == 4 && counts.outstanding() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        group.shutdown_and_join().await;

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 4);
        assert_eq!(counts.outstanding(), 0);
        assert_eq!(crawler.call_count(&Job::CrawlJudgement), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_does_not_take_its_worker_down() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::default());
        let queue = Arc::new(InMemoryLaneQueue::new(
            DedupGuard::new(kv.clone(), Duration::from_secs(3600)),
            RetryPolicy::default(),
        ));
        let crawler = Arc::new(ScriptedCrawler::new());
        let boom = Job::CrawlPaste { id: "boom".into() };
        let fine = Job::CrawlPaste { id: "fine".into() };
        crawler.script_panic(&boom, "paste parser bug");
        let dispatcher = Arc::new(Dispatcher::new(
            crawler.clone(),
            queue.clone(),
            RecencyCache::new(kv, Duration::from_secs(600)),
        ));

        queue.submit(boom.clone(), Lane::Immediate).await.unwrap();
        queue.submit(fine.clone(), Lane::Immediate).await.unwrap();

        // 1 ワーカーだけ: 落ちたら fine は永遠に走らない
        let group = WorkerGroup::spawn(
            WorkerBudget {
                immediate: 1,
                routine: 1,
                poll_interval: Duration::from_millis(50),
            },
            dispatcher,
        );
        for _ in 0..100 {
            if queue.counts().await.unwrap().outstanding() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.dead, 1);
        assert_eq!(counts.outstanding(), 0);
        assert_eq!(crawler.call_count(&fine), 1);
        assert!(queue.submit(boom, Lane::Immediate).await.unwrap().is_accepted());

        group.shutdown_and_join().await;
    }
}
