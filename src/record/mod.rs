pub mod bitmap;
mod error;
mod file_handle;
mod file_header;
mod inspect;
mod page;
mod rid;
mod scan;


pub use error::{RecordError, RecordResult};
pub use file_handle::RecordFileHandle;
pub use file_header::{FileHeader, RecordFileOptions};
pub use inspect::{FileReport, PageReport};
pub use page::{PageHandle, PageHeader, PageLayout};
pub use rid::{Rid, SlotId};
pub use scan::Scan;

use crate::file::{FileHandle, PagedFileManager, SharedBufferManager, lock_shared};
use log::{info, warn};
use std::path::Path;

/// Creates, opens, closes and destroys record files over one shared buffer pool
pub struct RecordManager {
    buffer_manager: SharedBufferManager,
}

impl RecordManager {
    pub fn new(buffer_manager: SharedBufferManager) -> Self {
        Self { buffer_manager }
    }

    pub fn buffer_manager(&self) -> &SharedBufferManager {
        &self.buffer_manager
    }

    /// Create an empty record file
    pub fn create_file<P: AsRef<Path>>(&self, path: P, options: RecordFileOptions) -> RecordResult<()> {
        let path = path.as_ref();
        let header = FileHeader::new(&options)?;

        let mut buffer_manager = lock_shared(&self.buffer_manager);
        let file_manager = buffer_manager.file_manager_mut();
        file_manager.create_file(path)?;
        let fd = file_manager.open_file(path)?;
        let written = file_manager.write_header(fd, &header.serialize());
        file_manager.close_file(fd)?;
        written?;

        info!(
            "created record file {} ({} byte records, {} per page)",
            path.display(),
            header.record_size,
            header.num_records_per_page
        );
        Ok(())
    }

    /// Open a record file and load its header
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<RecordFileHandle> {
        let path = path.as_ref();

        let mut buffer_manager = lock_shared(&self.buffer_manager);
        let file_manager = buffer_manager.file_manager_mut();
        let fd = file_manager.open_file(path)?;

        let header = match Self::load_header(file_manager, fd) {
            Ok(header) => header,
            Err(e) => {
                file_manager.close_file(fd)?;
                return Err(e);
            }
        };
        drop(buffer_manager);

        info!(
            "opened record file {} ({} pages)",
            path.display(),
            header.num_pages
        );
        Ok(RecordFileHandle::new(fd, self.buffer_manager.clone(), header))
    }

    /// Persist the header, write back and drop the file's pages, close it.
    /// The pages and fd are released even when the header write fails.
    pub fn close_file(&self, file: RecordFileHandle) -> RecordResult<()> {
        let persisted = file.persist_header();

        let mut buffer_manager = lock_shared(&self.buffer_manager);
        buffer_manager.discard_file(file.fd())?;
        buffer_manager.file_manager_mut().close_file(file.fd())?;
        drop(buffer_manager);

        persisted?;
        info!("closed record file {}", file.fd().as_usize());
        Ok(())
    }

    /// Delete a record file from disk
    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<()> {
        let path = path.as_ref();
        lock_shared(&self.buffer_manager)
            .file_manager_mut()
            .remove_file(path)?;
        info!("destroyed record file {}", path.display());
        Ok(())
    }

    /// Read and validate the header. Data pages past `num_pages` were
    /// allocated but never committed to the header; they are cut off.
    fn load_header(file_manager: &mut PagedFileManager, fd: FileHandle) -> RecordResult<FileHeader> {
        let header = FileHeader::deserialize(&file_manager.read_header(fd)?)?;

        let page_count = file_manager.get_page_count(fd)?;
        if page_count < header.num_pages {
            return Err(RecordError::InvalidHeader(format!(
                "header counts {} pages but the file holds {}",
                header.num_pages, page_count
            )));
        }
        if page_count > header.num_pages {
            warn!(
                "dropping {} uncommitted pages past page {}",
                page_count - header.num_pages,
                header.num_pages
            );
            file_manager.truncate_pages(fd, header.num_pages)?;
        }

        Ok(header)
    }
}
