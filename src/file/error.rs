use std::io;
use thiserror::Error;

use super::PageKey;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Page {key} does not belong to table {table_id}")]
    WrongTable { key: PageKey, table_id: u32 },

    #[error("Page {0} is past the end of its file")]
    PageOutOfRange(PageKey),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("File handle limit reached")]
    TooManyOpenFiles,
}

impl FileError {
    /// Whether the failure came from the operating system rather than a bad request
    pub fn is_io(&self) -> bool {
        matches!(self, FileError::Io(_))
    }
}

pub type FileResult<T> = Result<T, FileError>;
