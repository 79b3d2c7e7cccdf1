mod error;
mod lock_table;

pub use error::{LockError, LockResult};
pub use lock_table::PageLockTable;

use crate::file::PageKey;
use crate::transaction::TransactionId;

/// Access a transaction asks for when fetching a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Shared lock
    ReadOnly,
    /// Exclusive lock
    ReadWrite,
}

/// Page-level transaction locks.
///
/// `acquire` may block the calling thread until the lock is granted, and fails
/// when waiting would deadlock or takes too long. The caller is expected to
/// abort the transaction on failure.
pub trait LockManager: Send + Sync {
    fn acquire(&self, tid: TransactionId, key: PageKey, perm: Permission) -> LockResult<()>;

    fn release(&self, tid: TransactionId, key: PageKey);

    fn release_all(&self, tid: TransactionId);

    fn holds(&self, tid: TransactionId, key: PageKey) -> bool;
}
