//! MemoryKvStore - 単一プロセス用の KvStore 実装
//!
//! 期限切れのエントリは「存在しない」として扱い、触れたタイミングで削除します。
//! 二度と読まれないキーは書き込み時の定期スイープで回収します。
//! 複数プロセスで共有する場合は外部ストア実装に差し替えてください。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::StoreError;
use crate::ports::{Clock, KvStore, SystemClock};

/// Minimum time between two sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct KvEntry {
    value: u64,
    expires_at: DateTime<Utc>,
}

struct KvState {
    entries: HashMap<String, KvEntry>,
    last_sweep: DateTime<Utc>,
}

impl KvState {
    /// Drop every expired entry, at most once per `SWEEP_INTERVAL`.
    fn sweep(&mut self, now: DateTime<Utc>) {
        let interval = chrono::Duration::from_std(SWEEP_INTERVAL).unwrap_or(chrono::Duration::MAX);
        if now.signed_duration_since(self.last_sweep) < interval {
            return;
        }
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.last_sweep = now;
    }
}

pub struct MemoryKvStore {
    clock: Arc<dyn Clock>,
    state: Mutex<KvState>,
}

impl MemoryKvStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now();
        Self {
            clock,
            state: Mutex::new(KvState {
                entries: HashMap::new(),
                last_sweep,
            }),
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Live entry for `key`, dropping it first if it has expired.
    fn live(
        entries: &mut HashMap<String, KvEntry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<KvEntry> {
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(*entry),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.sweep(now);
        if Self::live(&mut state.entries, key, now).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            KvEntry {
                value: 1,
                expires_at: self.expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn set_max(&self, key: &str, value: u64, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.sweep(now);
        if let Some(existing) = Self::live(&mut state.entries, key, now)
            && existing.value >= value
        {
            return Ok(existing.value);
        }
        state.entries.insert(
            key.to_string(),
            KvEntry {
                value,
                expires_at: self.expiry(ttl),
            },
        );
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(Self::live(&mut state.entries, key, self.clock.now()).map(|entry| entry.value))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.state.lock().await.entries.remove(key);
        Ok(())
    }
}
