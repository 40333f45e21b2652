//! archivist-core
//!
//! Incremental crawl scheduling for a forum archiver: what to fetch next, on
//! which lane, without queueing the same work twice.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（job, lane, outcome, retry, decision, record, errors）
//! - **ports**: 抽象化レイヤー（Crawler, LaneQueue, KvStore, Clock, IdGenerator）
//! - **app**: スケジューリングロジック（router, pagination, dedup, recency, dispatcher, scheduler）
//! - **impls**: 単一プロセス用の実装（InMemoryLaneQueue, MemoryKvStore）
//! - **config**: TOML 設定
//! - **observability**: キューの集計ビュー
//! - **testing**: テスト用の Crawler

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod testing;

pub use crate::config::{ArchivistConfig, ConfigError};
pub use crate::error::ArchivistError;
