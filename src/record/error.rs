use crate::file::FileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record not found: page_no={page_no}, slot_no={slot_no}")]
    RecordNotFound { page_no: usize, slot_no: usize },

    #[error("Page does not exist: page_no={0}")]
    PageNotExist(usize),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid record size: expected {expected}, got {actual}")]
    InvalidRecordSize { expected: usize, actual: usize },

    #[error("Invalid file options: {0}")]
    InvalidOptions(String),

    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    #[error("File error: {0}")]
    File(#[from] FileError),
}

impl RecordError {
    /// Whether the error describes a bad request rather than a broken file
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RecordError::RecordNotFound { .. } | RecordError::PageNotExist(_)
        )
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
