use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::buffer::{BufferPool, PoolConfig, PoolError};
use crate::catalog::{Catalog, CatalogError};
use crate::file::{PageKey, PageRef, TableId};
use crate::heap::Tuple;
use crate::lock::{LockManager, PageLockTable, Permission};
use crate::transaction::{TransactionId, TransactionIds};
use crate::wal::{LogError, LogFile, WriteAheadLog};

const LOG_FILE_NAME: &str = "wal.log";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot read/write file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Buffer pool error: {0}")]
    PoolError(#[from] PoolError),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("Log error: {0}")]
    LogError(#[from] LogError),

    #[error("{tid} is already {}", outcome.name())]
    AlreadyFinished { tid: TransactionId, outcome: Outcome },
}

/// How a transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    Aborted,
}

impl Outcome {
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Committed => "committed",
            Outcome::Aborted => "aborted",
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// A storage engine instance rooted at one directory.
///
/// Owns the catalog, the write-ahead log (`wal.log`), the page lock table and
/// the buffer pool, and wires them together. All of it is safe to share
/// between transaction threads behind an `Arc`.
pub struct Database {
    dir: PathBuf,
    catalog: Arc<Catalog>,
    locks: Arc<PageLockTable>,
    log: Arc<LogFile>,
    pool: BufferPool,
    tids: TransactionIds,
    finished: Mutex<AHashMap<TransactionId, Outcome>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(dir: P, config: PoolConfig) -> DatabaseResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let catalog = Arc::new(Catalog::open(&dir)?);
        let locks = Arc::new(PageLockTable::new(config.lock_timeout()));
        let log_path = dir.join(LOG_FILE_NAME);
        let last_tid = if log_path.exists() {
            LogFile::read_records(&log_path)?
                .iter()
                .map(|record| record.tid().as_u64())
                .max()
                .unwrap_or(0)
        } else {
            0
        };
        let log = Arc::new(LogFile::open(&log_path));
        let pool = BufferPool::new(
            config,
            Arc::clone(&catalog),
            Arc::clone(&locks) as Arc<dyn LockManager>,
            Arc::clone(&log) as Arc<dyn WriteAheadLog>,
        )?;

        info!(dir = %dir.display(), last_tid, "database opened");
        Ok(Self {
            dir,
            catalog,
            locks,
            log,
            pool,
            tids: TransactionIds::starting_after(last_tid),
            finished: Mutex::new(AHashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn log(&self) -> &LogFile {
        &self.log
    }

    pub fn locks(&self) -> &PageLockTable {
        &self.locks
    }

    pub fn begin(&self) -> TransactionId {
        let tid = self.tids.allocate();
        debug!(%tid, "transaction started");
        tid
    }

    pub fn create_table(&self, name: &str, tuple_size: usize) -> DatabaseResult<TableId> {
        Ok(self.catalog.create_table(name, tuple_size)?)
    }

    pub fn table_id(&self, name: &str) -> DatabaseResult<TableId> {
        Ok(self.catalog.table_id(name)?)
    }

    /// Store `data` as a new tuple; the returned tuple carries its record id
    pub fn insert(&self, tid: TransactionId, table_id: TableId, data: Vec<u8>) -> DatabaseResult<Tuple> {
        let mut tuple = Tuple::new(data);
        self.pool.insert_tuple(tid, table_id, &mut tuple)?;
        Ok(tuple)
    }

    pub fn delete(&self, tid: TransactionId, tuple: &Tuple) -> DatabaseResult<()> {
        Ok(self.pool.delete_tuple(tid, tuple)?)
    }

    pub fn scan(&self, tid: TransactionId, table_id: TableId) -> DatabaseResult<Vec<Tuple>> {
        let file = self.pool.file(table_id)?;
        Ok(file.scan(&self.pool, tid)?)
    }

    pub fn get_page(
        &self,
        tid: TransactionId,
        key: PageKey,
        perm: Permission,
    ) -> DatabaseResult<PageRef> {
        Ok(self.pool.get_page(tid, key, perm)?)
    }

    /// How `tid` ended, if it has
    pub fn outcome(&self, tid: TransactionId) -> Option<Outcome> {
        self.finished.lock().unwrap().get(&tid).copied()
    }

    /// Whether `tid` already ended as `wanted`. Ending it the other way is an error.
    fn already(&self, tid: TransactionId, wanted: Outcome) -> DatabaseResult<bool> {
        match self.outcome(tid) {
            None => Ok(false),
            Some(outcome) if outcome == wanted => Ok(true),
            Some(outcome) => Err(DatabaseError::AlreadyFinished { tid, outcome }),
        }
    }

    /// Flush `tid`'s pages, then make its commit record durable.
    /// Committing an already committed transaction does nothing.
    pub fn commit(&self, tid: TransactionId) -> DatabaseResult<()> {
        if self.already(tid, Outcome::Committed)? {
            return Ok(());
        }

        self.pool.transaction_complete(tid, true)?;
        self.log.log_commit(tid)?;
        self.log.force()?;
        self.finished.lock().unwrap().insert(tid, Outcome::Committed);
        debug!(%tid, "transaction committed");
        Ok(())
    }

    /// Roll back `tid`'s pages and record the abort.
    /// Aborting an already aborted transaction does nothing.
    pub fn abort(&self, tid: TransactionId) -> DatabaseResult<()> {
        if self.already(tid, Outcome::Aborted)? {
            return Ok(());
        }

        self.pool.transaction_complete(tid, false)?;
        self.log.log_abort(tid)?;
        self.finished.lock().unwrap().insert(tid, Outcome::Aborted);
        debug!(%tid, "transaction aborted");
        Ok(())
    }

    /// Write every cached page out and sync the log. Call with no transaction
    /// running: uncommitted changes would be persisted too.
    pub fn shutdown(&self) -> DatabaseResult<()> {
        self.pool.flush_all_pages()?;
        self.log.force()?;
        info!(dir = %self.dir.display(), "database shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
