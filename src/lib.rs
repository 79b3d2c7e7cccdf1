pub mod buffer;
pub mod catalog;
pub mod database;
pub mod file;
pub mod heap;
pub mod lock;
pub mod transaction;
pub mod wal;

pub use buffer::{BufferPool, DEFAULT_PAGES, ErrorKind, PoolConfig, PoolError, PoolResult, PoolStats};
pub use catalog::{Catalog, CatalogError, CatalogResult, TableMetadata};
pub use database::{Database, DatabaseError, DatabaseResult, Outcome};
pub use file::{DbFile, FileError, FileResult, PAGE_SIZE, Page, PageKey, PageRef, TableId};
pub use heap::{HeapError, HeapFile, HeapResult, RecordId, Tuple};
pub use lock::{LockError, LockManager, LockResult, PageLockTable, Permission};
pub use transaction::{TransactionId, TransactionIds};
pub use wal::{LogError, LogFile, LogRecord, LogRecordType, LogResult, WriteAheadLog};
