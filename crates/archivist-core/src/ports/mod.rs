//! Ports - 抽象化レイヤー
//!
//! 外部システム（クロール API + 保存層、共有 KV ストア、配送キュー）への
//! インターフェースを定義し、実装の詳細を隠蔽します。

pub mod clock;
pub mod crawler;
pub mod id_generator;
pub mod kv_store;
pub mod lane_queue;

pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::crawler::Crawler;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::kv_store::KvStore;
pub use self::lane_queue::{Admission, Claim, LaneQueue, Nack, NackOutcome};
