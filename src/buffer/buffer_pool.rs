use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace, warn};

use super::config::PoolConfig;
use super::error::{PoolError, PoolResult};
use crate::catalog::Catalog;
use crate::file::{DbFile, PageKey, PageRef, TableId};
use crate::heap::{HeapError, Tuple};
use crate::lock::{LockManager, Permission};
use crate::transaction::TransactionId;
use crate::wal::WriteAheadLog;

/// Cache counters since the pool was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Pages written to disk
    pub flushes: u64,
}

impl PoolStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct PoolState {
    pages: AHashMap<PageKey, PageRef>,
    /// Cached keys, oldest first
    order: VecDeque<PageKey>,
    /// Keys of the pages each live transaction has dirtied
    dirtied: AHashMap<TransactionId, AHashSet<PageKey>>,
    stats: PoolStats,
}

/// Bounded page cache shared by every transaction.
///
/// Pages are handed out as [`PageRef`]s after the requesting transaction has
/// been granted a page lock. Replacement is FIFO and NO-STEAL: a dirty page is
/// never evicted, so uncommitted bytes only reach disk through an explicit
/// flush, and every flush appends and forces a log record before the page is
/// written.
///
/// The internal mutex guards the cache map, the FIFO queue, the dirtied-page
/// index and every page's dirty marker and before-image. It is taken after any
/// lock-manager wait and before any page guard.
pub struct BufferPool {
    config: PoolConfig,
    catalog: Arc<Catalog>,
    locks: Arc<dyn LockManager>,
    log: Arc<dyn WriteAheadLog>,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(
        config: PoolConfig,
        catalog: Arc<Catalog>,
        locks: Arc<dyn LockManager>,
        log: Arc<dyn WriteAheadLog>,
    ) -> PoolResult<Self> {
        config.validate()?;
        info!(capacity = config.capacity, "buffer pool created");

        Ok(Self {
            state: Mutex::new(PoolState {
                pages: AHashMap::with_capacity(config.capacity),
                order: VecDeque::with_capacity(config.capacity),
                dirtied: AHashMap::new(),
                stats: PoolStats::default(),
            }),
            config,
            catalog,
            locks,
            log,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Fetch a page on behalf of `tid`, locking it with `perm` first.
    ///
    /// Blocks while the lock is held by another transaction. A lock failure is
    /// returned as is; the caller should abort `tid`. On a miss with a full
    /// cache one clean, unpinned page is evicted, or the call fails with
    /// [`PoolError::CacheExhausted`] and the cache is left as it was.
    ///
    /// A page stays pinned while the returned handle, or any clone of it, is
    /// alive. Drop handles as soon as the page is no longer needed; a cache
    /// full of dirty or pinned pages cannot take a new one.
    pub fn get_page(
        &self,
        tid: TransactionId,
        key: PageKey,
        perm: Permission,
    ) -> PoolResult<PageRef> {
        if let Err(e) = self.locks.acquire(tid, key, perm) {
            warn!(%tid, %key, error = %e, "page lock not granted");
            return Err(e.into());
        }

        let mut state = self.state.lock().unwrap();
        let cached = state.pages.get(&key).cloned();
        if let Some(page) = cached {
            state.stats.hits += 1;
            trace!(%tid, %key, "cache hit");
            return Ok(page);
        }

        state.stats.misses += 1;

        // Loaded under the pool mutex so two misses on one key cannot both insert it.
        // A page that cannot be read costs no eviction.
        let file = self.file(key.table_id)?;
        let page = file.read_page(key)?.into_ref();
        if state.pages.len() >= self.config.capacity {
            self.evict(&mut state)?;
        }
        state.pages.insert(key, Arc::clone(&page));
        state.order.push_back(key);

        debug!(%tid, %key, cached = state.pages.len(), "page loaded");
        Ok(page)
    }

    /// Drop the oldest page that is clean and not in use. Never writes to disk.
    fn evict(&self, state: &mut PoolState) -> PoolResult<()> {
        let victim = state.order.iter().position(|key| {
            state.pages.get(key).is_some_and(|page| {
                // Only the cache's own handle left, so no one else can hold the guard
                Arc::strong_count(page) == 1 && !page.read().unwrap().is_dirty()
            })
        });

        let Some(index) = victim else {
            warn!(capacity = self.config.capacity, "no page can be evicted");
            return Err(PoolError::CacheExhausted {
                capacity: self.config.capacity,
            });
        };

        if let Some(key) = state.order.remove(index) {
            state.pages.remove(&key);
            state.stats.evictions += 1;
            debug!(%key, "page evicted");
        }
        Ok(())
    }

    /// Insert `tuple` into table `table_id` for `tid` and mark the pages it
    /// touched dirty. The tuple's record id is set to where it was stored.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> PoolResult<()> {
        let file = self.file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        for page in &pages {
            self.mark_dirty(tid, page);
        }
        Ok(())
    }

    /// Remove a stored tuple for `tid` and mark its page dirty
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> PoolResult<()> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        let file = self.file(rid.key.table_id)?;
        let page = file.delete_tuple(self, tid, tuple)?;
        self.mark_dirty(tid, &page);
        Ok(())
    }

    /// Record that `tid` has modified `page` in place
    pub fn mark_dirty(&self, tid: TransactionId, page: &PageRef) {
        let mut state = self.state.lock().unwrap();
        let (key, previous) = {
            let mut guard = page.write().unwrap();
            let previous = guard.dirtier();
            guard.mark_dirty(tid);
            (guard.key(), previous)
        };

        if let Some(previous) = previous
            && previous != tid
            && let Some(keys) = state.dirtied.get_mut(&previous)
        {
            keys.remove(&key);
        }
        state.dirtied.entry(tid).or_default().insert(key);
        trace!(%tid, %key, "page marked dirty");
    }

    /// Finish `tid`: flush its pages on commit, restore their before-images on
    /// abort. The transaction's locks are released whatever the outcome.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> PoolResult<()> {
        let result = if commit {
            self.flush_pages(tid)
        } else {
            self.roll_back(tid);
            Ok(())
        };

        self.locks.release_all(tid);
        match &result {
            Ok(()) => debug!(%tid, commit, "transaction complete"),
            Err(e) => warn!(%tid, commit, error = %e, "transaction completion failed"),
        }
        result
    }

    fn roll_back(&self, tid: TransactionId) {
        let mut state = self.state.lock().unwrap();
        let Some(keys) = state.dirtied.remove(&tid) else {
            return;
        };

        let mut restored = 0;
        for key in &keys {
            if let Some(page) = state.pages.get(key) {
                let mut guard = page.write().unwrap();
                if guard.dirtier() == Some(tid) {
                    guard.roll_back();
                    restored += 1;
                }
            }
        }
        debug!(%tid, restored, "dirty pages rolled back");
    }

    /// Write `page` out if it is dirty: log record, force, then the page
    /// itself. With `mark_clean` the written bytes become the new before-image.
    fn write_out(&self, state: &mut PoolState, page: &PageRef, mark_clean: bool) -> PoolResult<()> {
        let mut guard = page.write().unwrap();
        let Some(dirtier) = guard.dirtier() else {
            return Ok(());
        };

        let key = guard.key();
        let file = self.file(key.table_id)?;
        self.log
            .log_write(dirtier, key, guard.before_image(), guard.data())?;
        self.log.force()?;
        file.write_page(&guard)?;

        if mark_clean {
            guard.mark_flushed();
        }
        state.stats.flushes += 1;
        debug!(%key, tid = %dirtier, "page flushed");
        Ok(())
    }

    /// Write one cached page to disk if it is dirty. The page stays dirty.
    pub fn flush_page(&self, key: PageKey) -> PoolResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(page) = state.pages.get(&key).cloned() else {
            return Ok(());
        };
        self.write_out(&mut state, &page, false)
    }

    /// Write every dirty cached page to disk and sync the table files.
    ///
    /// This persists uncommitted changes; it is meant for shutdown, when no
    /// transaction is running.
    pub fn flush_all_pages(&self) -> PoolResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            let pages: Vec<PageRef> = state
                .order
                .iter()
                .filter_map(|key| state.pages.get(key).cloned())
                .collect();
            for page in &pages {
                self.write_out(&mut state, page, false)?;
            }
        }

        for table_id in self.catalog.table_ids() {
            self.file(table_id)?.sync()?;
        }
        info!("all pages flushed");
        Ok(())
    }

    /// Write the pages dirtied by `tid` and mark them clean
    pub fn flush_pages(&self, tid: TransactionId) -> PoolResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(keys) = state.dirtied.remove(&tid) else {
            return Ok(());
        };

        let mut keys: Vec<PageKey> = keys.into_iter().collect();
        keys.sort_unstable();

        for (i, key) in keys.iter().enumerate() {
            let Some(page) = state.pages.get(key).cloned() else {
                continue;
            };
            let owned = page.read().unwrap().dirtier() == Some(tid);
            if !owned {
                continue;
            }
            if let Err(e) = self.write_out(&mut state, &page, true) {
                state
                    .dirtied
                    .entry(tid)
                    .or_default()
                    .extend(keys[i..].iter().copied());
                return Err(e);
            }
        }
        Ok(())
    }

    /// Forget a cached page without writing it. Used by recovery.
    pub fn discard_page(&self, key: PageKey) {
        let mut state = self.state.lock().unwrap();
        if state.pages.remove(&key).is_none() {
            return;
        }
        state.order.retain(|k| *k != key);
        for keys in state.dirtied.values_mut() {
            keys.remove(&key);
        }
        state.dirtied.retain(|_, keys| !keys.is_empty());
        debug!(%key, "page discarded");
    }

    /// Give up `tid`'s lock on one page before the transaction ends.
    ///
    /// Unsafe for two-phase locking unless the caller knows the page was not
    /// used for anything the transaction depends on.
    pub fn release_page(&self, tid: TransactionId, key: PageKey) {
        self.locks.release(tid, key);
    }

    pub fn holds_lock(&self, tid: TransactionId, key: PageKey) -> bool {
        self.locks.holds(tid, key)
    }

    pub fn file(&self, table_id: TableId) -> PoolResult<Arc<dyn DbFile>> {
        Ok(self.catalog.file(table_id)?)
    }

    /// Number of cached pages
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn is_cached(&self, key: PageKey) -> bool {
        self.state.lock().unwrap().pages.contains_key(&key)
    }

    /// Cached keys in eviction order, oldest first
    pub fn cached_keys(&self) -> Vec<PageKey> {
        self.state.lock().unwrap().order.iter().copied().collect()
    }

    /// Dirty cached pages and the transaction that dirtied each
    pub fn dirty_pages(&self) -> Vec<(PageKey, TransactionId)> {
        let state = self.state.lock().unwrap();
        state
            .order
            .iter()
            .filter_map(|key| {
                let page = state.pages.get(key)?;
                let dirtier = page.read().unwrap().dirtier()?;
                Some((*key, dirtier))
            })
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        self.state.lock().unwrap().stats
    }
}
