//! Crawler port - クロール/保存を担う外部コラボレーター
//!
//! HTTP クライアント、ページのパース、スナップショットの upsert（content hash による
//! 重複排除）はすべてこの trait の向こう側にあります。スケジューラは戻り値の
//! 「鮮度の手がかり」だけを見て次のジョブを決めます。
//!
//! 各メソッドは `CrawlError::{AccessDenied, RateLimited, Transient}` を返し得ます。

use async_trait::async_trait;

use crate::domain::{CrawlError, DiscussionId, DiscussionPage, ListedDiscussion, ReplyId, ReplyPage};

#[async_trait]
pub trait Crawler: Send + Sync {
    /// Fetch one discussion page; `page: None` fetches thread metadata.
    async fn fetch_discussion_page(
        &self,
        id: DiscussionId,
        page: Option<u32>,
    ) -> Result<DiscussionPage, CrawlError>;

    /// Fetch and persist one article body.
    async fn fetch_article(&self, lid: &str) -> Result<(), CrawlError>;

    /// Fetch one page of replies, newest first, starting after `after`.
    async fn fetch_article_replies(
        &self,
        lid: &str,
        after: Option<ReplyId>,
    ) -> Result<ReplyPage, CrawlError>;

    async fn fetch_paste(&self, id: &str) -> Result<(), CrawlError>;

    async fn fetch_judgement_log(&self) -> Result<(), CrawlError>;

    async fn list_discussions(
        &self,
        forum: Option<&str>,
        page: Option<u32>,
    ) -> Result<Vec<ListedDiscussion>, CrawlError>;

    async fn list_articles(
        &self,
        collection: Option<&str>,
        page: Option<u32>,
    ) -> Result<Vec<String>, CrawlError>;
}
