use log::warn;
use std::cell::Cell;
use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};

use super::buffer_manager::{PageFrame, SharedBufferManager, lock_shared};
use super::error::FileResult;
use super::file_manager::FileHandle;
use super::PageId;

/// One pin on a buffered page.
///
/// The pin is released when the guard is dropped, on every exit path.
/// The page is reported dirty iff `write` or `mark_dirty` was called,
/// or the page was freshly allocated.
pub struct PinnedPage {
    pool: SharedBufferManager,
    file: FileHandle,
    page_id: PageId,
    frame: PageFrame,
    dirty: Cell<bool>,
}

impl PinnedPage {
    /// Pin an existing page of `file`
    pub fn fetch(pool: &SharedBufferManager, file: FileHandle, page_id: PageId) -> FileResult<Self> {
        let frame = lock_shared(pool).fetch_page(file, page_id)?;
        Ok(Self {
            pool: pool.clone(),
            file,
            page_id,
            frame,
            dirty: Cell::new(false),
        })
    }

    /// Append a zeroed page to `file` and pin it
    pub fn allocate(pool: &SharedBufferManager, file: FileHandle) -> FileResult<Self> {
        let (page_id, frame) = lock_shared(pool).new_page(file)?;
        Ok(Self {
            pool: pool.clone(),
            file,
            page_id,
            frame,
            dirty: Cell::new(true),
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    /// Borrow the page bytes read-only
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.frame.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow the page bytes for writing; the page will be unpinned dirty
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.dirty.set(true);
        self.frame.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        let result = lock_shared(&self.pool).unpin_page(self.file, self.page_id, self.dirty.get());
        if let Err(e) = result {
            warn!("failed to unpin page {}: {}", self.page_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{BufferManager, PagedFileManager};
    use tempfile::TempDir;

    fn setup_test_env() -> (TempDir, SharedBufferManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.db");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        (temp_dir, BufferManager::with_capacity(file_manager, 4).into_shared(), handle)
    }

    #[test]
    fn test_drop_unpins_clean() {
        let (_temp_dir, pool, handle) = setup_test_env();

        {
            let page = PinnedPage::fetch(&pool, handle, 0).unwrap();
            assert_eq!(page.read()[0], 0);
            assert_eq!(lock_shared(&pool).pin_count(handle, 0), 1);
        }

        let bm = lock_shared(&pool);
        assert_eq!(bm.pin_count(handle, 0), 0);
        assert_eq!(bm.dirty_page_count(), 0);
    }

    #[test]
    fn test_write_unpins_dirty() {
        let (_temp_dir, pool, handle) = setup_test_env();

        {
            let page = PinnedPage::fetch(&pool, handle, 0).unwrap();
            page.write()[0] = 5;
            assert!(page.is_dirty());
        }

        assert_eq!(lock_shared(&pool).dirty_page_count(), 1);
        let page = PinnedPage::fetch(&pool, handle, 0).unwrap();
        assert_eq!(page.read()[0], 5);
    }

    #[test]
    fn test_allocate_is_dirty_and_pinned() {
        let (_temp_dir, pool, handle) = setup_test_env();

        let page = PinnedPage::allocate(&pool, handle).unwrap();
        assert_eq!(page.page_id(), 0);
        assert!(page.is_dirty());
        assert_eq!(lock_shared(&pool).pin_count(handle, 0), 1);

        drop(page);
        assert_eq!(lock_shared(&pool).pin_count(handle, 0), 0);
    }

    #[test]
    fn test_nested_pins_release_independently() {
        let (_temp_dir, pool, handle) = setup_test_env();

        let first = PinnedPage::fetch(&pool, handle, 1).unwrap();
        let second = PinnedPage::fetch(&pool, handle, 1).unwrap();
        assert_eq!(lock_shared(&pool).pin_count(handle, 1), 2);

        drop(second);
        assert_eq!(lock_shared(&pool).pin_count(handle, 1), 1);
        drop(first);
        assert_eq!(lock_shared(&pool).pin_count(handle, 1), 0);
    }
}
