//! Recurring scheduler: turns cron cadences into seed jobs.
//!
//! The cadences are configuration ([`SeedSchedule`]); the mechanism is one
//! cron job per entry that submits its seed through the queue, so a tick
//! that fires while the previous seed is still pending is absorbed by
//! deduplication.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info};

use crate::app::router;
use crate::domain::{Job, Lane, QueueError};
use crate::ports::{Admission, LaneQueue};

/// Article listing pages walked once a day.
const ARTICLE_LISTING_PAGES: u32 = 30;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule entry '{name}' has an invalid cron expression '{cron}': {source}")]
    InvalidCron {
        name: String,
        cron: String,
        #[source]
        source: JobSchedulerError,
    },

    #[error("duplicate schedule entry name: {0}")]
    DuplicateName(String),

    #[error("cron scheduler failure: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// One recurring cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub name: String,

    /// Six-field cron expression (seconds first), UTC.
    pub cron: String,

    pub lane: Lane,
    pub job: Job,
}

impl SeedEntry {
    pub fn new(name: impl Into<String>, cron: impl Into<String>, lane: Lane, job: Job) -> Self {
        Self {
            name: name.into(),
            cron: cron.into(),
            lane,
            job,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSchedule {
    pub entries: Vec<SeedEntry>,
}

impl SeedSchedule {
    pub fn new(entries: Vec<SeedEntry>) -> Self {
        Self { entries }
    }

    /// Built-in cadences.
    ///
    /// - discussion listing page 1: every minute 08-23h, every 5 minutes at night
    /// - discussion listing pages 2, 3, 4 and 20: every 2 to 5 minutes
    /// - article listing pages 1..=30: once a day each, one per minute from 04:01
    /// - judgement log: every minute
    pub fn defaults() -> Self {
        let listing = |page: u32| Job::ListDiscussions {
            forum: None,
            page: Some(page),
        };

        let mut entries = vec![
            SeedEntry::new(
                "discuss-listing-1-day",
                "0 * 8-23 * * *",
                router::route_listing_seed(Some(1)),
                listing(1),
            ),
            SeedEntry::new(
                "discuss-listing-1-night",
                "0 */5 0-7 * * *",
                router::route_listing_seed(Some(1)),
                listing(1),
            ),
        ];
        for (page, every) in [(2u32, 2u32), (3, 3), (4, 4), (20, 5)] {
            entries.push(SeedEntry::new(
                format!("discuss-listing-{page}"),
                format!("{} */{every} * * * *", page % 60),
                router::route_listing_seed(Some(page)),
                listing(page),
            ));
        }
        for page in 1..=ARTICLE_LISTING_PAGES {
            entries.push(SeedEntry::new(
                format!("article-listing-{page}"),
                format!("0 {page} 4 * * *"),
                router::route_listing_seed(Some(page)),
                Job::ListArticles {
                    collection: None,
                    page: Some(page),
                },
            ));
        }
        entries.push(SeedEntry::new(
            "judgement",
            "0 * * * * *",
            Lane::Immediate,
            Job::CrawlJudgement,
        ));

        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Names must be unique so log lines and overrides stay unambiguous.
    pub fn check_names(&self) -> Result<(), ScheduleError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(ScheduleError::DuplicateName(entry.name.clone()));
            }
        }
        Ok(())
    }
}

/// Submit one seed. A seed that is still pending is not queued twice.
pub async fn fire(queue: &dyn LaneQueue, entry: &SeedEntry) -> Result<Admission, QueueError> {
    let admission = queue.submit(entry.job.clone(), entry.lane).await?;
    match admission {
        Admission::Accepted(entry_id) => {
            info!(schedule = %entry.name, key = %entry.job.dedup_key(), lane = %entry.lane, %entry_id, "seed queued")
        }
        Admission::AlreadyPending => {
            debug!(schedule = %entry.name, key = %entry.job.dedup_key(), "seed still pending")
        }
    }
    Ok(admission)
}

fn cron_job(queue: Arc<dyn LaneQueue>, entry: SeedEntry) -> Result<CronJob, ScheduleError> {
    let name = entry.name.clone();
    let cron = entry.cron.clone();
    let entry = Arc::new(entry);
    CronJob::new_async(cron.as_str(), move |_uuid, _lock| {
        let queue = Arc::clone(&queue);
        let entry = Arc::clone(&entry);
        Box::pin(async move {
            if let Err(err) = fire(queue.as_ref(), &entry).await {
                error!(schedule = %entry.name, error = %err, "failed to submit seed");
            }
        })
    })
    .map_err(|source| ScheduleError::InvalidCron { name, cron, source })
}

/// Running recurring schedule.
pub struct RecurringScheduler {
    scheduler: JobScheduler,
}

impl RecurringScheduler {
    /// Register every entry and start ticking.
    pub async fn start(
        queue: Arc<dyn LaneQueue>,
        schedule: &SeedSchedule,
    ) -> Result<Self, ScheduleError> {
        schedule.check_names()?;

        let scheduler = JobScheduler::new().await?;
        for entry in &schedule.entries {
            let job = cron_job(Arc::clone(&queue), entry.clone())?;
            scheduler.add(job).await?;
            debug!(schedule = %entry.name, cron = %entry.cron, "cadence registered");
        }
        scheduler.start().await?;
        info!(entries = schedule.len(), "recurring schedule started");

        Ok(Self { scheduler })
    }

    pub async fn shutdown(mut self) -> Result<(), ScheduleError> {
        self.scheduler.shutdown().await?;
        info!("recurring schedule stopped");
        Ok(())
    }
}

/// Validate every cron expression without starting anything.
pub fn validate(schedule: &SeedSchedule) -> Result<(), ScheduleError> {
    schedule.check_names()?;
    for entry in &schedule.entries {
        CronJob::new_async(entry.cron.as_str(), |_uuid, _lock| Box::pin(async {})).map_err(
            |source| ScheduleError::InvalidCron {
                name: entry.name.clone(),
                cron: entry.cron.clone(),
                source,
            },
        )?;
    }
    Ok(())
}
