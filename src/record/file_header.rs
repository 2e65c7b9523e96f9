use super::bitmap;
use super::error::{RecordError, RecordResult};
use super::page::PageHeader;
use crate::file::{PAGE_SIZE, PageId};
use serde::Serialize;

/// On-disk encoding of "no page" in free-list links
pub(crate) const NO_PAGE: u32 = u32::MAX;

const MAGIC: u32 = 0x524D_4631; // "RMF1"

/// Options fixed when a record file is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFileOptions {
    pub record_size: usize,
    /// Cap on slots per page; `None` fills the page
    pub records_per_page: Option<usize>,
}

impl RecordFileOptions {
    pub fn new(record_size: usize) -> Self {
        Self {
            record_size,
            records_per_page: None,
        }
    }

    pub fn with_records_per_page(mut self, records_per_page: usize) -> Self {
        self.records_per_page = Some(records_per_page);
        self
    }
}

/// Per-file metadata, kept in memory by the file handle and mirrored in the
/// reserved header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    pub record_size: usize,
    pub num_records_per_page: usize,
    pub num_pages: usize,
    pub bitmap_size: usize,
    pub first_free_page_no: Option<PageId>,
}

impl FileHeader {
    pub const SIZE: usize = 24;

    /// Header of an empty file
    pub fn new(options: &RecordFileOptions) -> RecordResult<Self> {
        let max = Self::max_records_per_page(options.record_size);
        if max == 0 {
            return Err(RecordError::InvalidOptions(format!(
                "record size {} does not fit in a page",
                options.record_size
            )));
        }

        let num_records_per_page = match options.records_per_page {
            None => max,
            Some(0) => {
                return Err(RecordError::InvalidOptions(
                    "records per page must be positive".to_string(),
                ));
            }
            Some(n) if n > max => {
                return Err(RecordError::InvalidOptions(format!(
                    "{} records of {} bytes do not fit in a page (max {})",
                    n, options.record_size, max
                )));
            }
            Some(n) => n,
        };

        Ok(Self {
            record_size: options.record_size,
            num_records_per_page,
            num_pages: 0,
            bitmap_size: bitmap::bytes_for(num_records_per_page),
            first_free_page_no: None,
        })
    }

    /// Maximum number of slots for a given record size
    pub fn max_records_per_page(record_size: usize) -> usize {
        if record_size == 0 || record_size > PAGE_SIZE {
            return 0;
        }

        let available = PAGE_SIZE - PageHeader::SIZE;

        // bitmap_size + slot_count * record_size <= available
        // with bitmap_size = ⌈slot_count / 8⌉
        (available * 8) / (1 + record_size * 8)
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let first_free = self.first_free_page_no.map_or(NO_PAGE, |p| p as u32);

        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        result[4..8].copy_from_slice(&(self.record_size as u32).to_le_bytes());
        result[8..12].copy_from_slice(&(self.num_records_per_page as u32).to_le_bytes());
        result[12..16].copy_from_slice(&(self.num_pages as u32).to_le_bytes());
        result[16..20].copy_from_slice(&(self.bitmap_size as u32).to_le_bytes());
        result[20..24].copy_from_slice(&first_free.to_le_bytes());
        result
    }

    pub fn deserialize(data: &[u8]) -> RecordResult<Self> {
        if data.len() < Self::SIZE {
            return Err(RecordError::InvalidHeader(format!(
                "expected {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let field = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        if field(0) != MAGIC {
            return Err(RecordError::InvalidHeader(format!(
                "bad magic {:#010x}",
                field(0)
            )));
        }

        let header = Self {
            record_size: field(4) as usize,
            num_records_per_page: field(8) as usize,
            num_pages: field(12) as usize,
            bitmap_size: field(16) as usize,
            first_free_page_no: match field(20) {
                NO_PAGE => None,
                p => Some(p as PageId),
            },
        };

        let max = Self::max_records_per_page(header.record_size);
        if header.num_records_per_page == 0 || header.num_records_per_page > max {
            return Err(RecordError::InvalidHeader(format!(
                "{} records per page of {} bytes",
                header.num_records_per_page, header.record_size
            )));
        }
        if header.bitmap_size != bitmap::bytes_for(header.num_records_per_page) {
            return Err(RecordError::InvalidHeader(format!(
                "bitmap size {} for {} records per page",
                header.bitmap_size, header.num_records_per_page
            )));
        }
        if let Some(page_no) = header.first_free_page_no
            && page_no >= header.num_pages
        {
            return Err(RecordError::InvalidHeader(format!(
                "free list head {} beyond {} pages",
                page_no, header.num_pages
            )));
        }

        Ok(header)
    }
}
