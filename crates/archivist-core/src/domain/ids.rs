//! Entry identifiers.
//!
//! ULID ベース: 時刻でソートでき、調整なしで複数プロセスから採番できる。
//! dedup key（論理的な仕事の同一性）とは別物で、1 回の submit ごとに 1 つ振られる。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one queued unit of work (one accepted submission of a job).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Ulid);

impl EntryId {
    const PREFIX: &'static str = "entry-";

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for EntryId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_prefix() {
        let ulid = Ulid::new();
        let id = EntryId::from_ulid(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert_eq!(id.to_string(), format!("entry-{ulid}"));
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let ulid = Ulid::new();
        let json = serde_json::to_string(&EntryId::from(ulid)).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));
    }
}
