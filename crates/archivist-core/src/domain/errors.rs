//! Errors - エラー型と分類
//!
//! クロール実行時のエラーは `CrawlError` に集約し、`ErrorKind` で運用上の分類を行います。
//! - AccessDenied: コンテンツが消えた / 閲覧不可（リトライ無意味）
//! - RateLimited: 429 系（Retry-After だけ待って同じジョブを再実行）
//! - Transient: その他の HTTP / ネットワーク失敗（バックオフ付きで有限回リトライ）
//! - Fatal: バグや復旧不能な状態（リトライしない）

use std::time::Duration;

use thiserror::Error;

/// Operational classification of a crawl failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AccessDenied,
    RateLimited,
    Transient,
    Fatal,
}

/// Failure surfaced by the crawl collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("upstream failure: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl CrawlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::AccessDenied(_) => ErrorKind::AccessDenied,
            CrawlError::RateLimited { .. } => ErrorKind::RateLimited,
            CrawlError::Transient(_) => ErrorKind::Transient,
            CrawlError::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

/// Failure of the shared key-value store (dedup tokens, recency markers).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for CrawlError {
    // Store outages are retried like any other upstream hiccup.
    fn from(err: StoreError) -> Self {
        CrawlError::Transient(err.to_string())
    }
}

/// Failure of a `LaneQueue` backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("unknown entry {0}")]
    UnknownEntry(String),

    #[error("entry {entry} is not running")]
    NotRunning { entry: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CrawlError::AccessDenied("gone".into()), ErrorKind::AccessDenied)]
    #[case(CrawlError::RateLimited { retry_after: Duration::from_secs(3) }, ErrorKind::RateLimited)]
    #[case(CrawlError::Transient("502".into()), ErrorKind::Transient)]
    #[case(CrawlError::Fatal("bad payload".into()), ErrorKind::Fatal)]
    fn crawl_errors_map_to_kinds(#[case] err: CrawlError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn store_errors_are_retried_as_transient() {
        let err: CrawlError = StoreError::Unavailable("timeout".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
