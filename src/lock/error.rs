use std::time::Duration;
use thiserror::Error;

use crate::file::PageKey;
use crate::transaction::TransactionId;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{tid} would deadlock waiting for page {key}")]
    Deadlock { tid: TransactionId, key: PageKey },

    #[error("{tid} timed out after {waited:?} waiting for page {key}")]
    Timeout {
        tid: TransactionId,
        key: PageKey,
        waited: Duration,
    },
}

pub type LockResult<T> = Result<T, LockError>;
