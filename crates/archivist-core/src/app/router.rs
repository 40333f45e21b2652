//! Lane router.
//!
//! Lanes are chosen from freshness evidence observed by the previous
//! execution, not from a fixed per-type table.

use crate::domain::{DiscussionPage, Lane, ReplyPage};

/// First crawl of an item that a listing just surfaced.
pub fn route_discovered() -> Lane {
    Lane::Immediate
}

/// Lane for re-discovering a thread a listing surfaced, or `None` when the
/// listing shows nothing new since it was last seen.
///
/// `previous` is the reply count recorded the last time the thread was
/// listed; `None` means this is its first crawl.
pub fn route_listed(previous: Option<u32>, reply_count: u32) -> Option<Lane> {
    match previous {
        None => Some(route_discovered()),
        Some(seen) if reply_count > seen => Some(Lane::Immediate),
        Some(_) => None,
    }
}

/// Lane for the `page - 1` job emitted after fetching a discussion page.
///
/// Demoted to `Routine` when most replies on the fetched page were already
/// known (`num_new_replies` below half of `num_replies`);
/// otherwise inherits the lane of the job that produced it.
pub fn route_previous_page(current: Lane, observed: &DiscussionPage) -> Lane {
    if observed.is_stale() {
        Lane::Routine
    } else {
        current
    }
}

/// Lane for the next link of an article reply chain.
///
/// Walking back into already-stored history is background work.
pub fn route_reply_follow_up(current: Lane, observed: &ReplyPage) -> Lane {
    if observed.last_reply_saved {
        Lane::Routine
    } else {
        current
    }
}

/// Lane for a recurring listing seed: the first page carries fresh content,
/// deeper pages are backfill.
pub fn route_listing_seed(page: Option<u32>) -> Lane {
    match page {
        None | Some(0) | Some(1) => Lane::Immediate,
        Some(_) => Lane::Routine,
    }
}
