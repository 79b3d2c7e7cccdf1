//! The buffer pool: a bounded page cache that hands out pages under
//! transaction locks, evicts only clean pages (NO-STEAL), and on transaction
//! end either flushes a transaction's pages behind the write-ahead log or
//! rolls them back to their before-images.

mod buffer_pool;
mod config;
mod error;

pub use buffer_pool::{BufferPool, PoolStats};
pub use config::{DEFAULT_PAGES, PoolConfig};
pub use error::{ErrorKind, PoolError, PoolResult};
