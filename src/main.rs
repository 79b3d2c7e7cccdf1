use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use clap::{Parser, Subcommand};
use prettytable::{Table, row};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pagepool::{Database, DatabaseError, ErrorKind, LogFile, LogRecord, PoolConfig, TableId};

const WORKLOAD_TABLE: &str = "workload";
const WORKLOAD_TUPLE_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "pagepool", about = "Buffer pool workload driver and log inspector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run concurrent insert transactions against a database directory
    Workload {
        #[arg(long)]
        dir: PathBuf,
        /// JSON pool configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides the configured page capacity
        #[arg(long)]
        capacity: Option<usize>,
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Transactions per thread
        #[arg(long, default_value_t = 20)]
        txns: usize,
        /// Tuples inserted by each transaction
        #[arg(long, default_value_t = 8)]
        tuples: usize,
        /// Abort every Nth transaction instead of committing it (0 never aborts)
        #[arg(long, default_value_t = 5)]
        abort_every: usize,
    },
    /// Print the records of a log file
    LogDump { file: PathBuf },
}

#[derive(Default)]
struct Outcomes {
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicts: AtomicU64,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Workload {
            dir,
            config,
            capacity,
            threads,
            txns,
            tuples,
            abort_every,
        } => {
            let mut config = match config {
                Some(path) => PoolConfig::from_file(path)?,
                None => PoolConfig::default(),
            };
            if let Some(capacity) = capacity {
                config.capacity = capacity;
            }
            run_workload(dir, config, threads, txns, tuples, abort_every)
        }
        Command::LogDump { file } => dump_log(file),
    }
}

fn run_workload(
    dir: PathBuf,
    config: PoolConfig,
    threads: usize,
    txns: usize,
    tuples: usize,
    abort_every: usize,
) -> Result<(), Box<dyn Error>> {
    let db = Arc::new(Database::open(&dir, config)?);
    let table = match db.table_id(WORKLOAD_TABLE) {
        Ok(id) => id,
        Err(_) => db.create_table(WORKLOAD_TABLE, WORKLOAD_TUPLE_SIZE)?,
    };

    let outcomes = Arc::new(Outcomes::default());
    let workers: Vec<_> = (0..threads)
        .map(|worker| {
            let db = Arc::clone(&db);
            let outcomes = Arc::clone(&outcomes);
            thread::spawn(move || -> Result<(), DatabaseError> {
                for n in 0..txns {
                    let abort = abort_every > 0 && (n + 1) % abort_every == 0;
                    run_transaction(&db, table, worker, tuples, abort, &outcomes)?;
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().map_err(|_| "workload thread panicked")??;
    }

    db.shutdown()?;

    let stored = db.scan(db.begin(), table)?.len();
    let stats = db.pool().stats();
    let mut summary = Table::new();
    summary.add_row(row!["committed", outcomes.committed.load(Ordering::Relaxed)]);
    summary.add_row(row!["aborted", outcomes.aborted.load(Ordering::Relaxed)]);
    summary.add_row(row!["conflict aborts", outcomes.conflicts.load(Ordering::Relaxed)]);
    summary.add_row(row!["tuples stored", stored]);
    summary.add_row(row!["cache hits", stats.hits]);
    summary.add_row(row!["cache misses", stats.misses]);
    summary.add_row(row!["hit ratio", format!("{:.3}", stats.hit_ratio())]);
    summary.add_row(row!["evictions", stats.evictions]);
    summary.add_row(row!["pages flushed", stats.flushes]);
    summary.printstd();
    Ok(())
}

/// One insert transaction. Lock and cache-pressure failures abort it and are
/// counted; anything else is returned.
fn run_transaction(
    db: &Database,
    table: TableId,
    worker: usize,
    tuples: usize,
    abort: bool,
    outcomes: &Outcomes,
) -> Result<(), DatabaseError> {
    let tid = db.begin();
    let mut data = vec![0u8; WORKLOAD_TUPLE_SIZE];
    data[..8].copy_from_slice(&tid.as_u64().to_le_bytes());
    data[8..16].copy_from_slice(&(worker as u64).to_le_bytes());

    for i in 0..tuples {
        data[16..24].copy_from_slice(&(i as u64).to_le_bytes());
        if let Err(e) = db.insert(tid, table, data.clone()) {
            let retryable = matches!(
                &e,
                DatabaseError::PoolError(p)
                    if matches!(p.kind(), ErrorKind::LockTimeoutOrDeadlock | ErrorKind::CacheExhausted)
            );
            if !retryable {
                return Err(e);
            }
            warn!(%tid, error = %e, "transaction aborted");
            outcomes.conflicts.fetch_add(1, Ordering::Relaxed);
            outcomes.aborted.fetch_add(1, Ordering::Relaxed);
            return db.abort(tid);
        }
    }

    if abort {
        db.abort(tid)?;
        outcomes.aborted.fetch_add(1, Ordering::Relaxed);
    } else {
        db.commit(tid)?;
        outcomes.committed.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

fn dump_log(file: PathBuf) -> Result<(), Box<dyn Error>> {
    let records = LogFile::read_records(&file)?;
    info!(file = %file.display(), records = records.len(), "log decoded");

    let mut table = Table::new();
    table.add_row(row!["#", "type", "transaction", "page", "before", "after"]);
    for (i, record) in records.iter().enumerate() {
        let kind = record.record_type().name();
        match record {
            LogRecord::Update {
                tid,
                key,
                before,
                after,
            } => {
                let changed = before.iter().zip(after).filter(|(b, a)| b != a).count();
                table.add_row(row![
                    i,
                    kind,
                    tid,
                    key,
                    format!("{} bytes", before.len()),
                    format!("{} bytes, {} changed", after.len(), changed)
                ]);
            }
            LogRecord::Commit { tid } | LogRecord::Abort { tid } => {
                table.add_row(row![i, kind, tid, "", "", ""]);
            }
        }
    }
    table.printstd();
    Ok(())
}
