//! Job model: the closed set of crawlable work items and their identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::lane::Lane;

/// Numeric id of a discussion thread.
pub type DiscussionId = u64;

/// Numeric id of an article reply; used as the `after` cursor of a reply chain.
pub type ReplyId = u64;

/// One unit of crawlable work.
///
/// Identity is carried entirely by the variant and its fields, so two values
/// that compare equal always produce the same [`Job::dedup_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Discover discussion threads on a forum listing page.
    ListDiscussions {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        forum: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
    },

    /// Discover articles on a collection listing page.
    ListArticles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
    },

    /// Fetch one thread. Without `page` this is a discovery job that fans
    /// out into one job per page.
    CrawlDiscussion {
        id: DiscussionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<u32>,
    },

    /// Fetch one article body.
    CrawlArticle { lid: String },

    /// Fetch one page of an article's replies, walking forward from `after`.
    CrawlArticleReplies {
        lid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after: Option<ReplyId>,
    },

    /// Fetch one paste snapshot.
    CrawlPaste { id: String },

    /// Fetch the latest moderation-log page.
    CrawlJudgement,
}

impl Job {
    /// Deterministic identity of the logical work this job represents.
    ///
    /// Derived only from identity fields. A discovery job (`page: None`) has
    /// its own key so that it can fan out a `page: Some(1)` job while it is
    /// still in flight.
    pub fn dedup_key(&self) -> String {
        match self {
            Job::ListDiscussions { forum, page } => format!(
                "list-discuss:{}:{}",
                forum.as_deref().unwrap_or("all"),
                page.unwrap_or(1)
            ),
            Job::ListArticles { collection, page } => format!(
                "list-article:{}:{}",
                collection.as_deref().unwrap_or("all"),
                page.unwrap_or(1)
            ),
            Job::CrawlDiscussion { id, page: None } => format!("discuss:{id}"),
            Job::CrawlDiscussion { id, page: Some(page) } => format!("discuss:{id}:{page}"),
            Job::CrawlArticle { lid } => format!("article:{lid}"),
            Job::CrawlArticleReplies { lid, after } => match after {
                Some(after) => format!("article-replies:{lid}:{after}"),
                None => format!("article-replies:{lid}:head"),
            },
            Job::CrawlPaste { id } => format!("paste:{id}"),
            Job::CrawlJudgement => "judgement".to_string(),
        }
    }

    /// Short variant name, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::ListDiscussions { .. } => "list_discussions",
            Job::ListArticles { .. } => "list_articles",
            Job::CrawlDiscussion { .. } => "crawl_discussion",
            Job::CrawlArticle { .. } => "crawl_article",
            Job::CrawlArticleReplies { .. } => "crawl_article_replies",
            Job::CrawlPaste { .. } => "crawl_paste",
            Job::CrawlJudgement => "crawl_judgement",
        }
    }

    /// `CrawlDiscussion` without a page.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Job::CrawlDiscussion { page: None, .. })
    }

    pub fn discussion_page(id: DiscussionId, page: u32) -> Self {
        Job::CrawlDiscussion {
            id,
            page: Some(page),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dedup_key())
    }
}

/// A job derived from another job's execution, already routed to a lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub job: Job,
    pub lane: Lane,
}

impl FollowUp {
    pub fn new(job: Job, lane: Lane) -> Self {
        Self { job, lane }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::listing_defaults(Job::ListDiscussions { forum: None, page: None }, "list-discuss:all:1")]
    #[case::listing_page(Job::ListDiscussions { forum: Some("academics".into()), page: Some(3) }, "list-discuss:academics:3")]
    #[case::article_listing(Job::ListArticles { collection: None, page: Some(7) }, "list-article:all:7")]
    #[case::discovery(Job::CrawlDiscussion { id: 42, page: None }, "discuss:42")]
    #[case::page(Job::CrawlDiscussion { id: 42, page: Some(1) }, "discuss:42:1")]
    #[case::article(Job::CrawlArticle { lid: "abc12345".into() }, "article:abc12345")]
    #[case::reply_head(Job::CrawlArticleReplies { lid: "abc12345".into(), after: None }, "article-replies:abc12345:head")]
    #[case::reply_cursor(Job::CrawlArticleReplies { lid: "abc12345".into(), after: Some(991) }, "article-replies:abc12345:991")]
    #[case::paste(Job::CrawlPaste { id: "x1y2".into() }, "paste:x1y2")]
    #[case::judgement(Job::CrawlJudgement, "judgement")]
    fn dedup_key_is_derived_from_identity(#[case] job: Job, #[case] expected: &str) {
        assert_eq!(job.dedup_key(), expected);
    }

    #[test]
    fn listing_page_one_and_absent_page_share_a_key() {
        let explicit = Job::ListDiscussions {
            forum: None,
            page: Some(1),
        };
        let implicit = Job::ListDiscussions {
            forum: None,
            page: None,
        };
        assert_eq!(explicit.dedup_key(), implicit.dedup_key());
    }

    #[test]
    fn discovery_does_not_collide_with_first_page() {
        let discovery = Job::CrawlDiscussion { id: 9, page: None };
        assert!(discovery.is_discovery());
        assert_ne!(discovery.dedup_key(), Job::discussion_page(9, 1).dedup_key());
    }

    #[test]
    fn jobs_deserialize_from_tagged_json() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "kind": "crawl_discussion",
            "id": 42,
        }))
        .unwrap();
        assert_eq!(job, Job::CrawlDiscussion { id: 42, page: None });

        let job: Job = serde_json::from_value(serde_json::json!({ "kind": "crawl_judgement" })).unwrap();
        assert_eq!(job.kind(), "crawl_judgement");
    }
}
