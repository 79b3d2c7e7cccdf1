use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unexpected end of log at byte {0}")]
    UnexpectedEof(usize),

    #[error("Invalid log record type {0:#04x}")]
    InvalidType(u8),

    #[error("Malformed {record} record: {reason}")]
    Malformed { record: &'static str, reason: String },
}

pub type LogResult<T> = Result<T, LogError>;
