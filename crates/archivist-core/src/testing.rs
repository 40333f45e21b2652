//! Test doubles.
//!
//! `ScriptedCrawler` answers crawl calls from per-job FIFO scripts keyed by
//! dedup key and records every call it receives.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{
    CrawlError, DiscussionId, DiscussionPage, Job, ListedDiscussion, ReplyId, ReplyPage,
};
use crate::ports::Crawler;

#[derive(Debug)]
enum Scripted {
    Discussion(DiscussionPage),
    Replies(ReplyPage),
    Listing(Vec<ListedDiscussion>),
    Articles(Vec<String>),
    Failure(CrawlError),
    Panic(String),
}

/// Crawler double driven by scripted responses.
///
/// Calls without a script fall back to an "empty" answer: no replies, no
/// listed items, successful leaf fetches. Discussion pages have no sensible
/// empty answer and fail with `CrawlError::Fatal` instead. A scripted panic
/// unwinds out of the call.
#[derive(Debug, Default)]
pub struct ScriptedCrawler {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, job: &Job, scripted: Scripted) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.entry(job.dedup_key()).or_default().push_back(scripted);
    }

    pub fn script_discussion(&self, job: &Job, page: DiscussionPage) {
        self.push(job, Scripted::Discussion(page));
    }

    pub fn script_replies(&self, job: &Job, page: ReplyPage) {
        self.push(job, Scripted::Replies(page));
    }

    pub fn script_listing(&self, job: &Job, listed: Vec<ListedDiscussion>) {
        self.push(job, Scripted::Listing(listed));
    }

    pub fn script_articles(&self, job: &Job, lids: Vec<String>) {
        self.push(job, Scripted::Articles(lids));
    }

    pub fn script_failure(&self, job: &Job, err: CrawlError) {
        self.push(job, Scripted::Failure(err));
    }

    /// Make the next call for `job` panic with `message`.
    pub fn script_panic(&self, job: &Job, message: &str) {
        self.push(job, Scripted::Panic(message.to_string()));
    }

    /// Dedup keys of every call received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, job: &Job) -> usize {
        let key = job.dedup_key();
        self.calls().iter().filter(|call| **call == key).count()
    }

    fn next(&self, job: Job) -> Option<Scripted> {
        let key = job.dedup_key();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(Scripted::Panic(message)) = &scripted {
            panic!("{message}");
        }
        scripted
    }
}

fn mismatch(key: &str, got: &Scripted) -> CrawlError {
    CrawlError::Fatal(format!("script for {key} has the wrong shape: {got:?}"))
}

#[async_trait]
impl Crawler for ScriptedCrawler {
    async fn fetch_discussion_page(
        &self,
        id: DiscussionId,
        page: Option<u32>,
    ) -> Result<DiscussionPage, CrawlError> {
        let job = Job::CrawlDiscussion { id, page };
        let key = job.dedup_key();
        match self.next(job) {
            Some(Scripted::Discussion(observed)) => Ok(observed),
            Some(Scripted::Failure(err)) => Err(err),
            Some(other) => Err(mismatch(&key, &other)),
            None => Err(CrawlError::Fatal(format!("no script for {key}"))),
        }
    }

    async fn fetch_article(&self, lid: &str) -> Result<(), CrawlError> {
        let job = Job::CrawlArticle {
            lid: lid.to_string(),
        };
        match self.next(job) {
            Some(Scripted::Failure(err)) => Err(err),
            _ => Ok(()),
        }
    }

    async fn fetch_article_replies(
        &self,
        lid: &str,
        after: Option<ReplyId>,
    ) -> Result<ReplyPage, CrawlError> {
        let job = Job::CrawlArticleReplies {
            lid: lid.to_string(),
            after,
        };
        let key = job.dedup_key();
        match self.next(job) {
            Some(Scripted::Replies(observed)) => Ok(observed),
            Some(Scripted::Failure(err)) => Err(err),
            Some(other) => Err(mismatch(&key, &other)),
            None => Ok(ReplyPage::empty()),
        }
    }

    async fn fetch_paste(&self, id: &str) -> Result<(), CrawlError> {
        match self.next(Job::CrawlPaste { id: id.to_string() }) {
            Some(Scripted::Failure(err)) => Err(err),
            _ => Ok(()),
        }
    }

    async fn fetch_judgement_log(&self) -> Result<(), CrawlError> {
        match self.next(Job::CrawlJudgement) {
            Some(Scripted::Failure(err)) => Err(err),
            _ => Ok(()),
        }
    }

    async fn list_discussions(
        &self,
        forum: Option<&str>,
        page: Option<u32>,
    ) -> Result<Vec<ListedDiscussion>, CrawlError> {
        let job = Job::ListDiscussions {
            forum: forum.map(str::to_string),
            page,
        };
        let key = job.dedup_key();
        match self.next(job) {
            Some(Scripted::Listing(listed)) => Ok(listed),
            Some(Scripted::Failure(err)) => Err(err),
            Some(other) => Err(mismatch(&key, &other)),
            None => Ok(Vec::new()),
        }
    }

    async fn list_articles(
        &self,
        collection: Option<&str>,
        page: Option<u32>,
    ) -> Result<Vec<String>, CrawlError> {
        let job = Job::ListArticles {
            collection: collection.map(str::to_string),
            page,
        };
        let key = job.dedup_key();
        match self.next(job) {
            Some(Scripted::Articles(lids)) => Ok(lids),
            Some(Scripted::Failure(err)) => Err(err),
            Some(other) => Err(mismatch(&key, &other)),
            None => Ok(Vec::new()),
        }
    }
}
