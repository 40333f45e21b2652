//! IdGenerator port - エントリ ID の採番
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻で単調増加する ULID を採番
//!   （同一ミリ秒内でも submit 順に並ぶ）

use std::sync::Mutex;
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::EntryId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_entry_id(&self) -> EntryId;
}

/// Monotonic ULIDs stamped with the injected clock.
///
/// Ids generated by one generator sort in generation order, so listings
/// ordered by `EntryId` are submission order.
pub struct UlidGenerator<C> {
    clock: C,
    generator: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_entry_id(&self) -> EntryId {
        let at = SystemTime::from(self.clock.now());
        let mut generator = self.generator.lock().unwrap_or_else(|e| e.into_inner());
        // 同一ミリ秒で乱数部が溢れた時だけ非単調な ULID にフォールバック
        let ulid = generator
            .generate_from_datetime(at)
            .unwrap_or_else(|_| Ulid::from_datetime(at));
        EntryId::from(ulid)
    }
}
