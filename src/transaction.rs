use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifies one transaction for as long as the pool deals with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Rebuild an id read back from the log
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Unique id for tests that run without a `Database`
    #[cfg(test)]
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Hands out increasing transaction ids for one database.
///
/// Seeded with the highest id already in the database's log so ids from
/// earlier runs are never reused.
#[derive(Debug, Default)]
pub struct TransactionIds {
    last: AtomicU64,
}

impl TransactionIds {
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    pub fn allocate(&self) -> TransactionId {
        TransactionId(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recently allocated id, or the seed if none was allocated yet
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let ids = TransactionIds::default();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_eq!(a.as_u64(), 1);
        assert!(b > a);
        assert_eq!(ids.last(), 2);
    }

    #[test]
    fn test_seeded_ids_continue_after_seed() {
        let ids = TransactionIds::starting_after(41);
        assert_eq!(ids.allocate(), TransactionId::from_raw(42));
    }

    #[test]
    fn test_display() {
        assert_eq!(TransactionId::from_raw(7).to_string(), "tx-7");
    }
}
