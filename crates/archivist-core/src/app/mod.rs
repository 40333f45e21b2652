//! App - アプリケーション層
//!
//! ports を組み合わせてスケジューリングのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **router / pagination / replies**: 次のジョブとレーンを決める純粋関数
//! - **DedupGuard / RecencyCache**: KV ストア上の共有状態
//! - **Dispatcher**: 1 ジョブの実行と結果の解釈（ack / nack）
//! - **WorkerGroup**: レーンごとのワーカー
//! - **RecurringScheduler / RefreshTrigger**: seed ジョブの入口
//! - **ArchivistBuilder**: 構成からのワイヤリング

pub mod builder;
pub mod dedup;
pub mod dispatcher;
pub mod pagination;
pub mod recency;
pub mod replies;
pub mod router;
pub mod scheduler;
pub mod trigger;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::builder::{Archivist, ArchivistBuilder, BuildError};
pub use self::dedup::DedupGuard;
pub use self::dispatcher::Dispatcher;
pub use self::recency::RecencyCache;
pub use self::scheduler::{RecurringScheduler, ScheduleError, SeedEntry, SeedSchedule};
pub use self::trigger::{RefreshTarget, RefreshTrigger};
pub use self::worker_pool::{WorkerBudget, WorkerGroup};
