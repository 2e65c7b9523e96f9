pub mod file;
pub mod record;

pub use file::{
    BUFFER_POOL_SIZE, BufferManager, FileError, FileHandle, FileResult, PAGE_SIZE, PageId,
    PagedFileManager, PinnedPage, SharedBufferManager,
};
pub use record::{
    FileHeader, FileReport, PageReport, RecordError, RecordFileHandle, RecordFileOptions,
    RecordManager, RecordResult, Rid, Scan,
};
