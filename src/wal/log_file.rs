use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::error::LogResult;
use super::record::LogRecord;
use super::WriteAheadLog;
use crate::file::PageKey;
use crate::transaction::TransactionId;

/// Append-only write-ahead log.
///
/// Records are buffered in memory until [`WriteAheadLog::force`], which
/// flushes and fsyncs the file. The in-memory variant keeps the bytes in a
/// `Vec` and exists for tests and throwaway databases.
pub struct LogFile {
    inner: Mutex<LogInner>,
}

enum LogStorage {
    File {
        path: PathBuf,
        writer: Option<BufWriter<File>>,
    },
    InMemory {
        buffer: Vec<u8>,
    },
}

struct LogInner {
    storage: LogStorage,
    appended: u64,
    forced: u64,
}

impl LogFile {
    /// Log backed by `path`, appending to whatever is already there.
    /// The file is opened on first append.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::with_storage(LogStorage::File {
            path: path.as_ref().to_path_buf(),
            writer: None,
        })
    }

    pub fn in_memory() -> Self {
        Self::with_storage(LogStorage::InMemory { buffer: Vec::new() })
    }

    fn with_storage(storage: LogStorage) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                storage,
                appended: 0,
                forced: 0,
            }),
        }
    }

    pub fn log_commit(&self, tid: TransactionId) -> LogResult<()> {
        self.append(&LogRecord::Commit { tid })
    }

    pub fn log_abort(&self, tid: TransactionId) -> LogResult<()> {
        self.append(&LogRecord::Abort { tid })
    }

    /// Records appended through this handle, forced or not
    pub fn appended_count(&self) -> u64 {
        self.inner.lock().unwrap().appended
    }

    /// Records known to be on stable storage
    pub fn forced_count(&self) -> u64 {
        self.inner.lock().unwrap().forced
    }

    /// Decode everything in the log, including records not yet forced
    pub fn records(&self) -> LogResult<Vec<LogRecord>> {
        let mut inner = self.inner.lock().unwrap();
        match &mut inner.storage {
            LogStorage::File { path, writer } => {
                if let Some(w) = writer.as_mut() {
                    w.flush()?;
                }
                if !path.exists() {
                    return Ok(Vec::new());
                }
                LogRecord::decode_all(&std::fs::read(path)?)
            }
            LogStorage::InMemory { buffer } => LogRecord::decode_all(buffer),
        }
    }

    /// Decode a log file written by an earlier process
    pub fn read_records<P: AsRef<Path>>(path: P) -> LogResult<Vec<LogRecord>> {
        LogRecord::decode_all(&std::fs::read(path)?)
    }

    fn append(&self, record: &LogRecord) -> LogResult<()> {
        let mut buf = Vec::new();
        record.serialize(&mut buf);

        let mut inner = self.inner.lock().unwrap();
        let result = match &mut inner.storage {
            LogStorage::File { path, writer } => Self::write_to_file(path, writer, &buf),
            LogStorage::InMemory { buffer } => {
                buffer.extend_from_slice(&buf);
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                inner.appended += 1;
                Ok(())
            }
            Err(e) => {
                // Unforced records went down with the discarded writer
                let lost = inner.appended - inner.forced;
                inner.appended = inner.forced;
                warn!(lost, error = %e, "log append failed");
                Err(e)
            }
        }
    }

    fn write_to_file(path: &Path, writer: &mut Option<BufWriter<File>>, buf: &[u8]) -> LogResult<()> {
        if writer.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            *writer = Some(BufWriter::new(file));
        }
        let Some(w) = writer.as_mut() else {
            return Ok(());
        };

        if let Err(e) = w.write_all(buf) {
            // The buffer may end in part of this record. Dropping a BufWriter
            // flushes it, so take the file back without writing anything.
            if let Some(w) = writer.take() {
                let _ = w.into_parts();
            }
            return Err(e.into());
        }
        Ok(())
    }
}

impl WriteAheadLog for LogFile {
    fn log_write(
        &self,
        tid: TransactionId,
        key: PageKey,
        before: &[u8],
        after: &[u8],
    ) -> LogResult<()> {
        self.append(&LogRecord::Update {
            tid,
            key,
            before: before.to_vec(),
            after: after.to_vec(),
        })
    }

    fn force(&self) -> LogResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let LogStorage::File {
            writer: Some(w), ..
        } = &mut inner.storage
        {
            w.flush()?;
            w.get_ref().sync_data()?;
        }

        let newly_forced = inner.appended - inner.forced;
        inner.forced = inner.appended;
        if newly_forced > 0 {
            debug!(records = newly_forced, "log forced");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PAGE_SIZE;
    use crate::wal::{LogError, LogRecordType};

    #[test]
    fn test_in_memory_log() {
        let log = LogFile::in_memory();
        let tid = TransactionId::fresh();

        log.log_write(tid, PageKey::new(1, 0), &[0; 8], &[1; 8])
            .unwrap();
        log.log_commit(tid).unwrap();
        assert_eq!(log.appended_count(), 2);
        assert_eq!(log.forced_count(), 0);

        log.force().unwrap();
        assert_eq!(log.forced_count(), 2);

        let records = log.records().unwrap();
        assert_eq!(records[0].record_type(), LogRecordType::Update);
        assert_eq!(records[1], LogRecord::Commit { tid });
    }

    #[test]
    fn test_file_log_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("wal.log");
        let tid = TransactionId::fresh();

        {
            let log = LogFile::open(&path);
            assert!(log.records().unwrap().is_empty());
            log.log_write(tid, PageKey::new(4, 2), &[3; 4], &[4; 4])
                .unwrap();
            log.force().unwrap();
        }

        let log = LogFile::open(&path);
        log.log_abort(tid).unwrap();
        log.force().unwrap();

        let records = LogFile::read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            LogRecord::Update {
                tid,
                key: PageKey::new(4, 2),
                before: vec![3; 4],
                after: vec![4; 4],
            }
        );
        assert_eq!(records[1], LogRecord::Abort { tid });
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_append_leaves_nothing_to_flush() {
        // Every write to /dev/full fails with ENOSPC
        let log = LogFile::open("/dev/full");
        let tid = TransactionId::fresh();

        // Small enough to sit in the write buffer
        log.log_commit(tid).unwrap();
        assert_eq!(log.appended_count(), 1);

        // Larger than the buffer, so the buffered bytes are written first and fail
        let image = vec![0u8; PAGE_SIZE];
        let result = log.log_write(tid, PageKey::new(1, 0), &image, &image);
        assert!(matches!(result, Err(LogError::Io(_))));
        assert_eq!(log.appended_count(), 0);

        // Nothing half-written is left behind for the next force
        log.force().unwrap();
        assert_eq!(log.forced_count(), 0);
    }
}
