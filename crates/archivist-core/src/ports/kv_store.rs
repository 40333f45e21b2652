//! KvStore port - 共有の小さな key-value ストア
//!
//! スケジューラ自身が持つ共有可変状態は dedup トークンと recency マーカーだけです。
//! どちらもロックなしで並行実行に耐えるよう、条件付き更新の 2 プリミティブに絞っています。
//! - `set_if_absent`: トークン取得（なければ TTL 付きでセット）
//! - `set_max`: 既存値より大きい時だけ上書き（単調増加）
//!
//! 本番では Redis などの外部ストアが実装し、複数ワーカープロセスで共有します。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::StoreError;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` with `ttl` unless a live entry exists. Returns whether it was set.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Store `value` with `ttl` only if it is greater than the live value.
    /// Returns the value stored afterwards.
    async fn set_max(&self, key: &str, value: u64, ttl: Duration) -> Result<u64, StoreError>;

    /// Live value of `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
