use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File already exists: {}", .0.display())]
    FileAlreadyExists(PathBuf),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Page not buffered: page_id={0}")]
    PageNotFound(usize),

    #[error("Buffer pool is full: all {0} frames are pinned")]
    BufferPoolFull(usize),

    #[error("Page is not pinned: page_id={0}")]
    PageNotPinned(usize),

    #[error("Invalid page buffer: expected {expected} bytes, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Header of {actual} bytes does not fit in a {max} byte block")]
    HeaderTooLarge { max: usize, actual: usize },

    #[error("File handle limit reached")]
    TooManyOpenFiles,
}

pub type FileResult<T> = Result<T, FileError>;
