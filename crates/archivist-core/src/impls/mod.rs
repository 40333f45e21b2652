//! Impls - ports の実装（単一プロセス用）
//!
//! # 含まれる実装
//! - **InMemoryLaneQueue**: レーン分割 + 遅延再配送 + dedup トークン付きの配送キュー
//! - **MemoryKvStore**: TTL 付き KV（dedup トークン / recency マーカー）
//!
//! 複数プロセスで共有する本番構成では、外部ブローカー / 外部 KV の実装を別クレートに置きます。

pub mod inmem_kv;
pub mod inmem_queue;

pub use self::inmem_kv::MemoryKvStore;
pub use self::inmem_queue::InMemoryLaneQueue;
