//! Discussion pagination state machine.
//!
//! `Discover` → `Page(num_pages)` … `Page(1)` → done. The functions here are
//! pure: the dispatcher performs the fetch and the recency lookup, then asks
//! this module which jobs come next.

use crate::app::router;
use crate::domain::{DiscussionId, DiscussionPage, FollowUp, Job, Lane};

/// Where a `CrawlDiscussion` job sits in the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscussionStep {
    /// No page known yet: fetch metadata and fan out.
    Discover,
    Page(u32),
}

impl DiscussionStep {
    pub fn from_page(page: Option<u32>) -> Self {
        match page {
            None => DiscussionStep::Discover,
            Some(page) => DiscussionStep::Page(page),
        }
    }
}

/// Result of a page transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePlan {
    pub follow_ups: Vec<FollowUp>,

    /// The fetched page had no new replies; record it in the recency cache.
    pub mark_empty: bool,
}

/// Discovery: one job per page, last page first, all on `Immediate`.
pub fn fan_out(id: DiscussionId, observed: &DiscussionPage) -> Vec<FollowUp> {
    (1..=observed.num_pages)
        .rev()
        .map(|page| FollowUp::new(Job::discussion_page(id, page), Lane::Immediate))
        .collect()
}

/// Whether the `page - 1` decision depends on the recency cache.
///
/// Only `Routine` fan-out is ever pruned, so `Immediate` work never consults it.
pub fn needs_recency_check(page: u32, lane: Lane) -> bool {
    page > 1 && lane == Lane::Routine
}

/// Transition out of `Page(page)` after it was fetched on `lane`.
///
/// `previous_recently_empty` is the recency answer for `page - 1`; it is only
/// looked at when [`needs_recency_check`] holds.
pub fn plan_page(
    id: DiscussionId,
    page: u32,
    lane: Lane,
    observed: &DiscussionPage,
    previous_recently_empty: bool,
) -> PagePlan {
    let mut plan = PagePlan {
        follow_ups: Vec::new(),
        mark_empty: observed.is_empty_of_new(),
    };

    // Page(1) is terminal, and so is anything below it.
    if page <= 1 {
        return plan;
    }

    let previous = page - 1;
    let pruned = needs_recency_check(page, lane) && previous_recently_empty;
    if !pruned {
        plan.follow_ups.push(FollowUp::new(
            Job::discussion_page(id, previous),
            router::route_previous_page(lane, observed),
        ));
    }

    // New replies landed on the last page since discovery: go get them.
    // 直前で同じページを積んだ場合だけ省く
    let already_emitted = !pruned && observed.num_pages == previous;
    if !observed.most_recent_reply_captured && observed.num_pages >= 1 && !already_emitted {
        plan.follow_ups.push(FollowUp::new(
            Job::discussion_page(id, observed.num_pages),
            Lane::Immediate,
        ));
    }

    plan
}
