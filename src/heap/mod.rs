mod error;
mod heap_file;
mod heap_page;
mod tuple;

pub use error::{HeapError, HeapResult};
pub use heap_file::HeapFile;
pub use heap_page::{HeapPage, PageHeader};
pub use tuple::{RecordId, SlotId, Tuple};
