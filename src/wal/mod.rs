//! Write-ahead log.
//!
//! The buffer pool only needs [`WriteAheadLog`]: append an update record for a
//! page and force everything appended so far to stable storage. [`LogFile`] is
//! the implementation used by the database; it also records commit and abort
//! markers so a log dump shows each transaction's outcome.

mod error;
mod log_file;
mod record;

pub use error::{LogError, LogResult};
pub use log_file::LogFile;
pub use record::{LogRecord, LogRecordType};

use crate::file::PageKey;
use crate::transaction::TransactionId;

pub trait WriteAheadLog: Send + Sync {
    /// Append a record of `tid` changing `key` from `before` to `after`
    fn log_write(
        &self,
        tid: TransactionId,
        key: PageKey,
        before: &[u8],
        after: &[u8],
    ) -> LogResult<()>;

    /// Block until every record appended so far is durable
    fn force(&self) -> LogResult<()>;
}
