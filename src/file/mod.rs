mod buffer_manager;
mod error;
mod file_manager;
mod page_guard;

pub use buffer_manager::{BufferManager, PageFrame, SharedBufferManager, lock_shared};
pub use error::{FileError, FileResult};
pub use file_manager::{FileHandle, PagedFileManager};
pub use page_guard::PinnedPage;

/// Page size in bytes (8KB)
pub const PAGE_SIZE: usize = 8192;

/// Number of frames in the buffer pool
pub const BUFFER_POOL_SIZE: usize = 1024;

/// Page ID type
pub type PageId = usize;
