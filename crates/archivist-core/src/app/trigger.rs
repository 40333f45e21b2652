//! Refresh trigger: "save this now" requests from outside the scheduler.
//!
//! Callers get an admission acknowledgment only. The crawl itself happens
//! later on a worker, and its failures are never reported back here.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::domain::{DiscussionId, Job, Lane, QueueError};
use crate::error::ArchivistError;
use crate::ports::{Admission, LaneQueue};

/// An entity a user can ask to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTarget {
    Discussion(DiscussionId),
    Article(String),
    Paste(String),
    Judgement,
}

impl RefreshTarget {
    /// Seed job for the target. Discussions start from discovery so that
    /// every page is reconsidered.
    pub fn seed_job(&self) -> Job {
        match self {
            RefreshTarget::Discussion(id) => Job::CrawlDiscussion { id: *id, page: None },
            RefreshTarget::Article(lid) => Job::CrawlArticle { lid: lid.clone() },
            RefreshTarget::Paste(id) => Job::CrawlPaste { id: id.clone() },
            RefreshTarget::Judgement => Job::CrawlJudgement,
        }
    }
}

impl FromStr for RefreshTarget {
    type Err = ArchivistError;

    /// `discuss:<id>`, `article:<lid>`, `paste:<id>` or `judgement`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ArchivistError::InvalidTarget(s.to_string());
        let s = s.trim();
        if s == "judgement" {
            return Ok(RefreshTarget::Judgement);
        }

        let (kind, ident) = s.split_once(':').ok_or_else(invalid)?;
        if ident.is_empty() {
            return Err(invalid());
        }
        match kind {
            "discuss" => ident
                .parse()
                .map(RefreshTarget::Discussion)
                .map_err(|_| invalid()),
            "article" => Ok(RefreshTarget::Article(ident.to_string())),
            "paste" => Ok(RefreshTarget::Paste(ident.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTarget::Discussion(id) => write!(f, "discuss:{id}"),
            RefreshTarget::Article(lid) => write!(f, "article:{lid}"),
            RefreshTarget::Paste(id) => write!(f, "paste:{id}"),
            RefreshTarget::Judgement => f.write_str("judgement"),
        }
    }
}

#[derive(Clone)]
pub struct RefreshTrigger {
    queue: Arc<dyn LaneQueue>,
}

impl RefreshTrigger {
    pub fn new(queue: Arc<dyn LaneQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue a refresh on `Immediate`.
    pub async fn refresh(&self, target: &RefreshTarget) -> Result<Admission, QueueError> {
        let admission = self.queue.submit(target.seed_job(), Lane::Immediate).await?;
        info!(%target, accepted = admission.is_accepted(), "refresh requested");
        Ok(admission)
    }
}
