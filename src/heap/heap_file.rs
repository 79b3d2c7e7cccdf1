use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::error::{HeapError, HeapResult};
use super::heap_page::HeapPage;
use super::tuple::{RecordId, Tuple};
use crate::buffer::{BufferPool, PoolResult};
use crate::file::{
    DbFile, FileError, FileHandle, FileResult, PAGE_SIZE, Page, PageKey, PageNo, PageRef,
    PagedFileManager, TableId,
};
use crate::lock::Permission;
use crate::transaction::TransactionId;

/// A table stored as an unordered sequence of slotted pages.
///
/// Page I/O goes straight to disk and is only used by the buffer pool; tuple
/// operations go through the pool so every page they touch is locked and
/// cached.
pub struct HeapFile {
    table_id: TableId,
    tuple_size: usize,
    handle: FileHandle,
    files: Arc<Mutex<PagedFileManager>>,
    num_pages: AtomicUsize,
}

impl HeapFile {
    /// Create an empty table file
    pub fn create<P: AsRef<Path>>(
        files: Arc<Mutex<PagedFileManager>>,
        path: P,
        table_id: TableId,
        tuple_size: usize,
    ) -> HeapResult<Self> {
        if HeapPage::calculate_slot_count(tuple_size) == 0 {
            return Err(HeapError::TupleTooLarge(tuple_size));
        }

        let handle = {
            let mut manager = files.lock().unwrap();
            manager.create_file(&path)?;
            manager.open_file(&path)?
        };

        Ok(Self {
            table_id,
            tuple_size,
            handle,
            files,
            num_pages: AtomicUsize::new(0),
        })
    }

    /// Open an existing table file
    pub fn open<P: AsRef<Path>>(
        files: Arc<Mutex<PagedFileManager>>,
        path: P,
        table_id: TableId,
        tuple_size: usize,
    ) -> HeapResult<Self> {
        if HeapPage::calculate_slot_count(tuple_size) == 0 {
            return Err(HeapError::TupleTooLarge(tuple_size));
        }

        let (handle, page_count) = {
            let mut manager = files.lock().unwrap();
            let handle = manager.open_file(&path)?;
            (handle, manager.page_count(handle)?)
        };

        Ok(Self {
            table_id,
            tuple_size,
            handle,
            files,
            num_pages: AtomicUsize::new(page_count),
        })
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Put the tuple in the first free slot of `page_no`, if there is one.
    ///
    /// A page that turns out to be full is unlocked again unless `tid` already
    /// held a lock on it before this call.
    fn try_insert(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        page_no: PageNo,
        tuple: &mut Tuple,
    ) -> PoolResult<Option<PageRef>> {
        let key = PageKey::new(self.table_id, page_no);
        let held_before = pool.holds_lock(tid, key);
        let page = pool.get_page(tid, key, Permission::ReadWrite)?;

        let slot = {
            let mut guard = page.write().unwrap();
            let mut view = HeapPage::from_buffer(key, guard.data_mut())?;
            match view.find_free_slot() {
                Some(slot) => {
                    view.insert(slot, tuple.data())?;
                    Some(slot)
                }
                None => None,
            }
        };

        match slot {
            Some(slot) => {
                tuple.set_record_id(RecordId::new(key, slot));
                Ok(Some(page))
            }
            None => {
                if !held_before {
                    pool.release_page(tid, key);
                }
                Ok(None)
            }
        }
    }

    /// Append a freshly formatted empty page to the file
    fn allocate_page(&self) -> HeapResult<PageNo> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        HeapPage::init(&mut buffer, self.tuple_size)?;

        let page_no = self
            .files
            .lock()
            .unwrap()
            .append_page(self.handle, &buffer)?;
        self.num_pages.fetch_max(page_no + 1, Ordering::SeqCst);

        debug!(table = self.table_id, page_no, "allocated heap page");
        Ok(page_no)
    }

    fn check_key(&self, key: PageKey) -> FileResult<()> {
        if key.table_id != self.table_id {
            return Err(FileError::WrongTable {
                key,
                table_id: self.table_id,
            });
        }
        Ok(())
    }
}

impl DbFile for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn num_pages(&self) -> usize {
        self.num_pages.load(Ordering::SeqCst)
    }

    fn read_page(&self, key: PageKey) -> FileResult<Page> {
        self.check_key(key)?;
        if key.page_no >= self.num_pages() {
            return Err(FileError::PageOutOfRange(key));
        }

        let data = self
            .files
            .lock()
            .unwrap()
            .read_page(self.handle, key.page_no)?;
        Page::new(key, data)
    }

    fn write_page(&self, page: &Page) -> FileResult<()> {
        let key = page.key();
        self.check_key(key)?;
        self.files
            .lock()
            .unwrap()
            .write_page(self.handle, key.page_no, page.data())
    }

    fn sync(&self) -> FileResult<()> {
        self.files.lock().unwrap().sync_file(self.handle)
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> PoolResult<Vec<PageRef>> {
        if tuple.len() != self.tuple_size {
            return Err(HeapError::TupleSize {
                expected: self.tuple_size,
                actual: tuple.len(),
            }
            .into());
        }

        let mut next_page = 0;
        loop {
            let num_pages = self.num_pages();
            for page_no in next_page..num_pages {
                if let Some(page) = self.try_insert(pool, tid, page_no, tuple)? {
                    return Ok(vec![page]);
                }
            }

            // Every page was full; another inserter may fill the new one first
            next_page = num_pages;
            self.allocate_page()?;
        }
    }

    fn scan(&self, pool: &BufferPool, tid: TransactionId) -> PoolResult<Vec<Tuple>> {
        let mut tuples = Vec::new();

        for page_no in 0..self.num_pages() {
            let key = PageKey::new(self.table_id, page_no);
            let page = pool.get_page(tid, key, Permission::ReadOnly)?;
            let guard = page.read().unwrap();
            let view = HeapPage::from_buffer(key, guard.data())?;

            for slot in view.used_slots() {
                let data = view.get_tuple(slot)?.to_vec();
                tuples.push(Tuple::stored(data, RecordId::new(key, slot)));
            }
        }

        Ok(tuples)
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> PoolResult<PageRef> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        if rid.key.table_id != self.table_id {
            return Err(HeapError::WrongTable {
                expected: self.table_id,
                actual: rid.key.table_id,
            }
            .into());
        }

        let page = pool.get_page(tid, rid.key, Permission::ReadWrite)?;
        {
            let mut guard = page.write().unwrap();
            let mut view = HeapPage::from_buffer(rid.key, guard.data_mut())?;
            view.delete(rid.slot)?;
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PoolError;
    use crate::catalog::Catalog;
    use crate::lock::PageLockTable;
    use crate::wal::LogFile;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Env {
        _temp_dir: TempDir,
        pool: BufferPool,
        table_id: TableId,
    }

    fn setup(capacity: usize, tuple_size: usize) -> Env {
        let temp_dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::open(temp_dir.path()).unwrap());
        let table_id = catalog.create_table("t", tuple_size).unwrap();
        let pool = BufferPool::new(
            crate::buffer::PoolConfig {
                capacity,
                lock_timeout_ms: 50,
            },
            catalog,
            Arc::new(PageLockTable::new(Duration::from_millis(50))),
            Arc::new(LogFile::in_memory()),
        )
        .unwrap();

        Env {
            _temp_dir: temp_dir,
            pool,
            table_id,
        }
    }

    #[test]
    fn test_insert_allocates_first_page() {
        let env = setup(10, 8);
        let tid = TransactionId::fresh();

        let mut tuple = Tuple::new(vec![5; 8]);
        env.pool
            .insert_tuple(tid, env.table_id, &mut tuple)
            .unwrap();

        let rid = tuple.record_id().unwrap();
        assert_eq!(rid.key, PageKey::new(env.table_id, 0));
        assert_eq!(rid.slot, 0);

        assert_eq!(env.pool.file(env.table_id).unwrap().num_pages(), 1);
    }

    #[test]
    fn test_insert_spills_to_new_page() {
        let env = setup(10, 1000);
        let tid = TransactionId::fresh();
        let per_page = HeapPage::calculate_slot_count(1000);

        let mut last = None;
        for _ in 0..=per_page {
            let mut tuple = Tuple::new(vec![1; 1000]);
            env.pool
                .insert_tuple(tid, env.table_id, &mut tuple)
                .unwrap();
            last = tuple.record_id();
        }

        assert_eq!(last.unwrap().key.page_no, 1);
        assert_eq!(env.pool.file(env.table_id).unwrap().num_pages(), 2);
    }

    #[test]
    fn test_wrong_size_tuple_rejected() {
        let env = setup(10, 8);
        let tid = TransactionId::fresh();

        let mut tuple = Tuple::new(vec![1; 3]);
        let result = env.pool.insert_tuple(tid, env.table_id, &mut tuple);
        assert!(matches!(
            result,
            Err(PoolError::Heap(HeapError::TupleSize { .. }))
        ));
    }

    #[test]
    fn test_delete_requires_record_id() {
        let env = setup(10, 8);
        let tid = TransactionId::fresh();

        let result = env.pool.delete_tuple(tid, &Tuple::new(vec![0; 8]));
        assert!(matches!(
            result,
            Err(PoolError::Heap(HeapError::MissingRecordId))
        ));
    }

    #[test]
    fn test_scan_sees_uncommitted_inserts_of_same_transaction() {
        let env = setup(10, 8);
        let tid = TransactionId::fresh();

        for i in 0..3u8 {
            let mut tuple = Tuple::new(vec![i; 8]);
            env.pool
                .insert_tuple(tid, env.table_id, &mut tuple)
                .unwrap();
        }

        let file = env.pool.file(env.table_id).unwrap();
        let tuples = file.scan(&env.pool, tid).unwrap();
        let data: Vec<u8> = tuples.iter().map(|t| t.data()[0]).collect();
        assert_eq!(data, vec![0, 1, 2]);
        assert_eq!(
            tuples[2].record_id(),
            Some(RecordId::new(PageKey::new(env.table_id, 0), 2))
        );
    }

    #[test]
    fn test_read_page_out_of_range() {
        let env = setup(10, 8);
        let file = env.pool.file(env.table_id).unwrap();

        let result = file.read_page(PageKey::new(env.table_id, 0));
        assert!(matches!(result, Err(FileError::PageOutOfRange(_))));

        let result = file.read_page(PageKey::new(env.table_id + 1, 0));
        assert!(matches!(result, Err(FileError::WrongTable { .. })));
    }
}
