use super::error::FileResult;
use super::page::{Page, PageKey, PageRef};
use super::TableId;
use crate::buffer::{BufferPool, PoolResult};
use crate::heap::Tuple;
use crate::transaction::TransactionId;

/// One table's on-disk file as seen by the buffer pool.
///
/// `read_page`/`write_page` are raw disk I/O and are only called by the pool.
/// Tuple insert/delete go back through the pool to lock and fetch the pages
/// they touch, mutate those cached pages in place, and hand them back so the
/// pool can mark them dirty.
pub trait DbFile: Send + Sync {
    fn table_id(&self) -> TableId;

    fn num_pages(&self) -> usize;

    fn read_page(&self, key: PageKey) -> FileResult<Page>;

    fn write_page(&self, page: &Page) -> FileResult<()>;

    /// Push written pages down to stable storage
    fn sync(&self) -> FileResult<()>;

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> PoolResult<Vec<PageRef>>;

    /// Every stored tuple, read through the pool under shared locks for `tid`
    fn scan(&self, pool: &BufferPool, tid: TransactionId) -> PoolResult<Vec<Tuple>>;

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> PoolResult<PageRef>;
}
