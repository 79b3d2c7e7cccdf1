use thiserror::Error;

use crate::catalog::CatalogError;
use crate::file::FileError;
use crate::heap::HeapError;
use crate::lock::LockError;
use crate::wal::LogError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Buffer pool exhausted: all {capacity} cached pages are dirty or in use")]
    CacheExhausted { capacity: usize },

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Heap file error: {0}")]
    Heap(#[from] HeapError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`PoolError`] for callers deciding what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lock wait timed out or would deadlock; abort the transaction
    LockTimeoutOrDeadlock,
    /// Every cache slot holds a dirty page; another transaction must finish first
    CacheExhausted,
    /// A disk or log read/write failed
    Io,
    /// Anything else the storage layer rejected
    Storage,
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::Lock(_) => ErrorKind::LockTimeoutOrDeadlock,
            PoolError::CacheExhausted { .. } => ErrorKind::CacheExhausted,
            PoolError::File(e) | PoolError::Heap(HeapError::File(e)) if e.is_io() => ErrorKind::Io,
            PoolError::Log(LogError::Io(_)) => ErrorKind::Io,
            _ => ErrorKind::Storage,
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
