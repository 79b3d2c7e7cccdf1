use crate::file::{FileError, PageKey, TableId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Invalid slot: page={key}, slot={slot}")]
    InvalidSlot { key: PageKey, slot: usize },

    #[error("Slot is empty: page={key}, slot={slot}")]
    EmptySlot { key: PageKey, slot: usize },

    #[error("Tuple size mismatch: expected {expected}, got {actual}")]
    TupleSize { expected: usize, actual: usize },

    #[error("Tuple size {0} does not fit in a page")]
    TupleTooLarge(usize),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Tuple belongs to table {actual}, not table {expected}")]
    WrongTable { expected: TableId, actual: TableId },

    #[error("Corrupted page {key}: {reason}")]
    Corrupted { key: PageKey, reason: String },
}

pub type HeapResult<T> = Result<T, HeapError>;
