use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::error::{FileError, FileResult};
use super::{PAGE_SIZE, PageNo, TableId};
use crate::transaction::TransactionId;

/// Identifies a page: which table, and which page within it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    pub table_id: TableId,
    pub page_no: PageNo,
}

impl PageKey {
    pub fn new(table_id: TableId, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Shared handle to a cached page.
///
/// The buffer pool keeps one reference; every handle given out is another.
/// A page with handles outstanding is pinned and will not be evicted.
pub type PageRef = Arc<RwLock<Page>>;

/// In-memory copy of one disk page.
///
/// Besides the bytes it carries the transaction that dirtied it (if any) and
/// a before-image: the bytes as of the last time the page was known to match
/// disk. The before-image is what an abort rolls back to and what the log
/// records next to the new bytes on flush.
#[derive(Debug, Clone)]
pub struct Page {
    key: PageKey,
    data: Vec<u8>,
    before_image: Vec<u8>,
    dirtier: Option<TransactionId>,
}

impl Page {
    /// Wrap bytes just read from disk; the page starts clean
    pub fn new(key: PageKey, data: Vec<u8>) -> FileResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }

        Ok(Self {
            key,
            before_image: data.clone(),
            data,
            dirtier: None,
        })
    }

    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The transaction that dirtied this page, or `None` if it is clean
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    pub(crate) fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirtier = Some(tid);
    }

    /// Current bytes are durable: they become the rollback point and the page is clean again
    pub(crate) fn mark_flushed(&mut self) {
        self.before_image.copy_from_slice(&self.data);
        self.dirtier = None;
    }

    /// Throw away in-memory changes and go back to the before-image
    pub(crate) fn roll_back(&mut self) {
        self.data.copy_from_slice(&self.before_image);
        self.dirtier = None;
    }

    pub fn into_ref(self) -> PageRef {
        Arc::new(RwLock::new(self))
    }
}
