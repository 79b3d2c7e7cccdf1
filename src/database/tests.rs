use super::*;
use crate::wal::{LogRecord, LogRecordType};
use std::thread;
use tempfile::TempDir;

fn setup_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
    (temp_dir, db)
}

fn first_bytes(tuples: &[Tuple]) -> Vec<u8> {
    let mut bytes: Vec<u8> = tuples.iter().map(|t| t.data()[0]).collect();
    bytes.sort_unstable();
    bytes
}

#[test]
fn test_commit_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
        let table = db.create_table("items", 8).unwrap();

        let tid = db.begin();
        for i in 0..3u8 {
            db.insert(tid, table, vec![i; 8]).unwrap();
        }
        db.commit(tid).unwrap();
    }

    let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
    let table = db.table_id("items").unwrap();
    let tuples = db.scan(db.begin(), table).unwrap();
    assert_eq!(first_bytes(&tuples), vec![0, 1, 2]);
}

#[test]
fn test_uncommitted_changes_never_reach_disk() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
        let table = db.create_table("items", 8).unwrap();

        let tid = db.begin();
        db.insert(tid, table, vec![1; 8]).unwrap();
        // Dropped without commit or shutdown
    }

    let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
    let table = db.table_id("items").unwrap();
    assert!(db.scan(db.begin(), table).unwrap().is_empty());
}

#[test]
fn test_abort_rolls_back() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("items", 8).unwrap();

    let t1 = db.begin();
    db.insert(t1, table, vec![1; 8]).unwrap();
    db.commit(t1).unwrap();

    let t2 = db.begin();
    db.insert(t2, table, vec![2; 8]).unwrap();
    let existing = db.scan(t2, table).unwrap();
    assert_eq!(existing.len(), 2);
    db.delete(t2, &existing[0]).unwrap();
    db.abort(t2).unwrap();

    let tuples = db.scan(db.begin(), table).unwrap();
    assert_eq!(first_bytes(&tuples), vec![1]);
}

#[test]
fn test_delete_committed() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("items", 8).unwrap();

    let t1 = db.begin();
    let tuple = db.insert(t1, table, vec![4; 8]).unwrap();
    db.insert(t1, table, vec![5; 8]).unwrap();
    db.commit(t1).unwrap();

    let t2 = db.begin();
    db.delete(t2, &tuple).unwrap();
    db.commit(t2).unwrap();

    let tuples = db.scan(db.begin(), table).unwrap();
    assert_eq!(first_bytes(&tuples), vec![5]);
}

#[test]
fn test_log_records_outcomes() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("items", 8).unwrap();

    let t1 = db.begin();
    db.insert(t1, table, vec![1; 8]).unwrap();
    db.commit(t1).unwrap();

    let t2 = db.begin();
    db.insert(t2, table, vec![2; 8]).unwrap();
    db.abort(t2).unwrap();

    // Only what was forced is on disk; the abort record is still buffered
    let on_disk = LogFile::read_records(db.dir().join("wal.log")).unwrap();
    assert_eq!(on_disk.len(), 2);

    let records = db.log().records().unwrap();
    let types: Vec<LogRecordType> = records.iter().map(LogRecord::record_type).collect();
    assert_eq!(
        types,
        vec![
            LogRecordType::Update,
            LogRecordType::Commit,
            LogRecordType::Abort
        ]
    );
    assert_eq!(records[0].tid(), t1);
    assert_eq!(records[2].tid(), t2);
}

#[test]
fn test_commit_twice_logs_once() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("items", 8).unwrap();

    let tid = db.begin();
    db.insert(tid, table, vec![1; 8]).unwrap();
    db.commit(tid).unwrap();
    db.commit(tid).unwrap();
    assert_eq!(db.outcome(tid), Some(Outcome::Committed));

    let err = db.abort(tid).unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::AlreadyFinished {
            outcome: Outcome::Committed,
            ..
        }
    ));

    let types: Vec<LogRecordType> = db
        .log()
        .records()
        .unwrap()
        .iter()
        .filter(|r| r.tid() == tid)
        .map(LogRecord::record_type)
        .collect();
    assert_eq!(types, vec![LogRecordType::Update, LogRecordType::Commit]);

    let tuples = db.scan(db.begin(), table).unwrap();
    assert_eq!(first_bytes(&tuples), vec![1]);
}

#[test]
fn test_abort_twice_logs_once() {
    let (_temp, db) = setup_test_db();
    let table = db.create_table("items", 8).unwrap();

    let tid = db.begin();
    db.insert(tid, table, vec![1; 8]).unwrap();
    db.abort(tid).unwrap();
    db.abort(tid).unwrap();
    assert_eq!(db.outcome(tid), Some(Outcome::Aborted));
    assert!(matches!(
        db.commit(tid),
        Err(DatabaseError::AlreadyFinished {
            outcome: Outcome::Aborted,
            ..
        })
    ));

    let types: Vec<LogRecordType> = db
        .log()
        .records()
        .unwrap()
        .iter()
        .filter(|r| r.tid() == tid)
        .map(LogRecord::record_type)
        .collect();
    assert_eq!(types, vec![LogRecordType::Update, LogRecordType::Abort]);
}

#[test]
fn test_ids_continue_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let first = {
        let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
        let table = db.create_table("items", 8).unwrap();
        let tid = db.begin();
        db.insert(tid, table, vec![1; 8]).unwrap();
        db.commit(tid).unwrap();
        tid
    };

    let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
    let table = db.table_id("items").unwrap();
    let second = db.begin();
    assert!(second > first);
    db.insert(second, table, vec![2; 8]).unwrap();
    db.commit(second).unwrap();

    // Every commit in the appended log belongs to a different transaction
    let records = LogFile::read_records(db.dir().join("wal.log")).unwrap();
    let commits: Vec<TransactionId> = records
        .iter()
        .filter(|r| r.record_type() == LogRecordType::Commit)
        .map(LogRecord::tid)
        .collect();
    assert_eq!(commits, vec![first, second]);
}

#[test]
fn test_shutdown_flushes_everything() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
        let table = db.create_table("items", 8).unwrap();
        let tid = db.begin();
        db.insert(tid, table, vec![6; 8]).unwrap();
        db.shutdown().unwrap();
    }

    let db = Database::open(temp_dir.path(), PoolConfig::default()).unwrap();
    let table = db.table_id("items").unwrap();
    assert_eq!(db.scan(db.begin(), table).unwrap().len(), 1);
}

#[test]
fn test_conflicting_writer_times_out() {
    let temp_dir = TempDir::new().unwrap();
    let config = PoolConfig {
        capacity: 10,
        lock_timeout_ms: 50,
    };
    let db = Database::open(temp_dir.path(), config).unwrap();
    let table = db.create_table("items", 8).unwrap();

    let t1 = db.begin();
    db.insert(t1, table, vec![1; 8]).unwrap();

    let t2 = db.begin();
    let err = db.insert(t2, table, vec![2; 8]).unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::PoolError(PoolError::Lock(_))
    ));
    db.abort(t2).unwrap();
    db.commit(t1).unwrap();

    let t3 = db.begin();
    db.insert(t3, table, vec![3; 8]).unwrap();
    db.commit(t3).unwrap();
    assert_eq!(db.scan(db.begin(), table).unwrap().len(), 2);
}

#[test]
fn test_concurrent_transactions() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open(temp_dir.path(), PoolConfig::default()).unwrap());
    let table = db.create_table("items", 8).unwrap();

    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                // Lock conflicts abort the attempt; retry until it commits
                loop {
                    let tid = db.begin();
                    let result = (0..10u8)
                        .try_for_each(|i| db.insert(tid, table, vec![n * 10 + i; 8]).map(|_| ()));
                    match result {
                        Ok(()) => {
                            db.commit(tid).unwrap();
                            break;
                        }
                        Err(_) => db.abort(tid).unwrap(),
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let tuples = db.scan(db.begin(), table).unwrap();
    assert_eq!(first_bytes(&tuples), (0..40).collect::<Vec<u8>>());
    assert!(db.pool().dirty_pages().is_empty());
}
