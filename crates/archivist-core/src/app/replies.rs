//! Article reply chain: cursor-paginated walk over an article's replies.

use crate::app::router;
use crate::domain::{FollowUp, Job, Lane, ReplyPage};

/// Next link of the chain after fetching `lid` from the current cursor.
///
/// The chain ends when the page came back empty. Otherwise it continues from
/// the oldest reply on the page; once it reaches replies that were already
/// stored it keeps going on `Routine` instead of stopping, so a full backfill
/// still completes eventually.
pub fn next_link(lid: &str, lane: Lane, observed: &ReplyPage) -> Option<FollowUp> {
    let after = observed.last_reply_id?;
    Some(FollowUp::new(
        Job::CrawlArticleReplies {
            lid: lid.to_string(),
            after: Some(after),
        },
        router::route_reply_follow_up(lane, observed),
    ))
}

/// Head of a reply chain, started after an article body was captured.
pub fn chain_head(lid: &str, lane: Lane) -> FollowUp {
    FollowUp::new(
        Job::CrawlArticleReplies {
            lid: lid.to_string(),
            after: None,
        },
        lane,
    )
}
