//! ArchivistBuilder - 構成からのワイヤリング
//!
//! KV ストア・キュー・dedup guard・recency cache・dispatcher を 1 か所で組み立てます。
//! 起動時検証（Fail-fast）: crawler 未設定や不正な設定は build() でエラーにします。

use std::sync::Arc;

use crate::app::dedup::DedupGuard;
use crate::app::dispatcher::Dispatcher;
use crate::app::recency::RecencyCache;
use crate::app::scheduler::{RecurringScheduler, ScheduleError, SeedSchedule};
use crate::app::trigger::RefreshTrigger;
use crate::app::worker_pool::{WorkerBudget, WorkerGroup};
use crate::config::{ArchivistConfig, ConfigError};
use crate::impls::{InMemoryLaneQueue, MemoryKvStore};
use crate::ports::{Crawler, KvStore, LaneQueue};

/// # 使用例
/// ```ignore
/// let archivist = ArchivistBuilder::new(config)
///     .crawler(Arc::new(MyCrawler::new()))
///     .build()?;
/// let workers = archivist.start_workers();
/// ```
pub struct ArchivistBuilder {
    config: ArchivistConfig,
    crawler: Option<Arc<dyn Crawler>>,
    kv: Option<Arc<dyn KvStore>>,
}

/// BuildError はワイヤリング時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no crawler configured")]
    MissingCrawler,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ArchivistBuilder {
    pub fn new(config: ArchivistConfig) -> Self {
        Self {
            config,
            crawler: None,
            kv: None,
        }
    }

    pub fn crawler(mut self, crawler: Arc<dyn Crawler>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    /// Shared key-value store for dedup tokens and recency markers.
    /// Defaults to an in-process store.
    pub fn kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn build(self) -> Result<Archivist, BuildError> {
        self.config.validate()?;
        let crawler = self.crawler.ok_or(BuildError::MissingCrawler)?;
        let kv = self
            .kv
            .unwrap_or_else(|| Arc::new(MemoryKvStore::default()) as Arc<dyn KvStore>);

        let guard = DedupGuard::new(Arc::clone(&kv), self.config.dedup_ttl());
        let queue = Arc::new(InMemoryLaneQueue::new(guard, self.config.retry_policy()));
        let recency = RecencyCache::new(kv, self.config.recency_ttl());
        let dispatcher = Arc::new(Dispatcher::new(
            crawler,
            queue.clone() as Arc<dyn LaneQueue>,
            recency,
        ));

        Ok(Archivist {
            trigger: RefreshTrigger::new(queue.clone()),
            schedule: self.config.schedule(),
            budget: self.config.worker_budget(),
            queue,
            dispatcher,
        })
    }
}

/// A wired archiver, not yet running.
pub struct Archivist {
    pub queue: Arc<InMemoryLaneQueue>,
    pub dispatcher: Arc<Dispatcher>,
    pub trigger: RefreshTrigger,
    pub schedule: SeedSchedule,
    pub budget: WorkerBudget,
}

impl Archivist {
    pub fn start_workers(&self) -> WorkerGroup {
        WorkerGroup::spawn(self.budget, Arc::clone(&self.dispatcher))
    }

    pub async fn start_schedule(&self) -> Result<RecurringScheduler, ScheduleError> {
        RecurringScheduler::start(self.queue.clone(), &self.schedule).await
    }
}
