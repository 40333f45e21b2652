//! Observations reported by the crawl collaborator, and the result of
//! dispatching one claimed job.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::job::{DiscussionId, ReplyId};

/// What one discussion fetch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionPage {
    /// Number of pages the thread has right now.
    pub num_pages: u32,

    /// Replies on the fetched page.
    pub num_replies: u32,

    /// Replies on the fetched page that no earlier snapshot had.
    pub num_new_replies: u32,

    /// Whether the thread's globally most recent reply is present in some
    /// captured snapshot after this fetch.
    pub most_recent_reply_captured: bool,
}

impl DiscussionPage {
    /// Mostly backfill territory: fewer than half of the page's replies were new.
    pub fn is_stale(&self) -> bool {
        u64::from(self.num_new_replies) * 2 < u64::from(self.num_replies)
    }

    /// No reply on this page was new.
    pub fn is_empty_of_new(&self) -> bool {
        self.num_new_replies == 0
    }
}

/// What one article-replies fetch observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplyPage {
    /// Oldest reply id returned on this page; `None` when no replies came back.
    pub last_reply_id: Option<ReplyId>,

    /// Whether that reply was already stored before this fetch.
    pub last_reply_saved: bool,
}

impl ReplyPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One row of a forum listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedDiscussion {
    pub id: DiscussionId,
    pub reply_count: u32,
}

/// How the dispatcher disposed of one claimed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Executed; `follow_ups` jobs were offered to the queue, `admitted` of them accepted.
    Completed { follow_ups: usize, admitted: usize },

    /// Content is gone or forbidden; retired without retry.
    Dropped { reason: String },

    /// Rate limited; slept and handed back for re-delivery.
    Requeued { slept: Duration },

    /// Transient failure; the queue scheduled another attempt.
    RetryScheduled { attempt: u32, delay: Duration },

    /// Gave up: attempts exhausted or a fatal error.
    Dead { reason: String },
}

impl DispatchOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Completed { .. }
                | DispatchOutcome::Dropped { .. }
                | DispatchOutcome::Dead { .. }
        )
    }
}
