mod db_file;
mod error;
mod file_manager;
mod page;

pub use db_file::DbFile;
pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, PagedFileManager};
pub use page::{Page, PageKey, PageRef};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Table identifier, assigned by the catalog
pub type TableId = u32;

/// Page number within a table file
pub type PageNo = usize;
