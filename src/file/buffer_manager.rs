use log::{debug, warn};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, PagedFileManager};
use super::{BUFFER_POOL_SIZE, PAGE_SIZE, PageId};

/// Bytes of one buffered page. Shared so a pinned page can be borrowed
/// while the buffer manager itself is not locked.
pub type PageFrame = Arc<RwLock<Vec<u8>>>;

/// A buffer manager shared by every open record file
pub type SharedBufferManager = Arc<Mutex<BufferManager>>;

/// Lock a shared buffer manager. A panic in another holder does not leave
/// the pool in a torn state, so poisoning is ignored.
pub fn lock_shared(pool: &SharedBufferManager) -> MutexGuard<'_, BufferManager> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileHandle,
    page_id: PageId,
}

/// Entry in the buffer pool
struct BufferEntry {
    frame: PageFrame,
    /// Whether this page has been modified
    dirty: bool,
    /// Outstanding pins; a pinned page is never evicted
    pin_count: usize,
}

/// Manages a buffer pool with LRU eviction of unpinned pages
pub struct BufferManager {
    /// Underlying file manager
    file_manager: PagedFileManager,
    /// Combined buffer pool and LRU tracker
    buffer_pool: LruCache<BufferKey, BufferEntry>,
    /// Maximum size of the buffer pool
    max_pool_size: usize,
    /// Reusable buffer for loading pages, recycled from evicted frames
    load_buffer: Vec<u8>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(file_manager: PagedFileManager) -> Self {
        Self::with_capacity(file_manager, BUFFER_POOL_SIZE)
    }

    /// Create a new buffer manager with specified capacity (at least one frame)
    pub fn with_capacity(file_manager: PagedFileManager, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            file_manager,
            buffer_pool: LruCache::new(capacity),
            max_pool_size: capacity.get(),
            load_buffer: vec![0u8; PAGE_SIZE],
        }
    }

    /// Wrap the buffer manager for sharing between record files
    pub fn into_shared(self) -> SharedBufferManager {
        Arc::new(Mutex::new(self))
    }

    /// Get a reference to the file manager
    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    /// Get a mutable reference to the file manager
    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    /// Pin a page, loading it from disk if necessary.
    /// Every successful fetch must be paired with one `unpin_page`.
    pub fn fetch_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<PageFrame> {
        let key = BufferKey { file, page_id };

        if self.buffer_pool.peek(&key).is_none() {
            self.load_page(key)?;
        }

        // get_mut also refreshes the LRU position
        let entry = self
            .buffer_pool
            .get_mut(&key)
            .ok_or(FileError::PageNotFound(page_id))?;
        entry.pin_count += 1;
        Ok(Arc::clone(&entry.frame))
    }

    /// Allocate a new zeroed page at the end of `file` and pin it.
    /// The page is dirty from the start so it reaches disk even if never written.
    pub fn new_page(&mut self, file: FileHandle) -> FileResult<(PageId, PageFrame)> {
        // Make room before growing the file so a full pool leaves no orphan page
        self.make_room()?;

        let page_id = self.file_manager.allocate_page(file)?;
        let frame = Arc::new(RwLock::new(vec![0u8; PAGE_SIZE]));
        self.buffer_pool.put(
            BufferKey { file, page_id },
            BufferEntry {
                frame: Arc::clone(&frame),
                dirty: true,
                pin_count: 1,
            },
        );

        debug!("allocated page {} in file {}", page_id, file.as_usize());
        Ok((page_id, frame))
    }

    /// Release one pin; `is_dirty` is sticky until the page is flushed
    pub fn unpin_page(&mut self, file: FileHandle, page_id: PageId, is_dirty: bool) -> FileResult<()> {
        let key = BufferKey { file, page_id };

        let entry = self
            .buffer_pool
            .peek_mut(&key)
            .ok_or(FileError::PageNotFound(page_id))?;

        if entry.pin_count == 0 {
            return Err(FileError::PageNotPinned(page_id));
        }

        entry.pin_count -= 1;
        entry.dirty |= is_dirty;
        Ok(())
    }

    /// Mark a page as dirty (modified)
    pub fn mark_dirty(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let key = BufferKey { file, page_id };

        let entry = self
            .buffer_pool
            .peek_mut(&key)
            .ok_or(FileError::PageNotFound(page_id))?;

        entry.dirty = true;
        Ok(())
    }

    /// Flush a specific page to disk if it's dirty
    pub fn flush_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<()> {
        let key = BufferKey { file, page_id };

        if let Some(entry) = self.buffer_pool.peek_mut(&key)
            && entry.dirty
        {
            let data = entry.frame.read().unwrap_or_else(PoisonError::into_inner);
            self.file_manager.write_page(file, page_id, &data)?;
            drop(data);
            entry.dirty = false;
        }

        Ok(())
    }

    /// Flush every dirty page of one file and sync it
    pub fn flush_file(&mut self, file: FileHandle) -> FileResult<()> {
        let dirty_pages: Vec<BufferKey> = self
            .buffer_pool
            .iter()
            .filter(|(key, entry)| key.file == file && entry.dirty)
            .map(|(key, _)| *key)
            .collect();

        for key in dirty_pages {
            self.flush_page(key.file, key.page_id)?;
        }

        self.file_manager.sync_file(file)
    }

    /// Flush all dirty pages to disk
    pub fn flush_all(&mut self) -> FileResult<()> {
        // iter() does not touch the LRU order
        let dirty_pages: Vec<BufferKey> = self
            .buffer_pool
            .iter()
            .filter(|(_, entry)| entry.dirty)
            .map(|(key, _)| *key)
            .collect();

        for key in dirty_pages {
            self.flush_page(key.file, key.page_id)?;
        }

        self.file_manager.sync_all()?;

        Ok(())
    }

    /// Flush a file's pages and drop them from the pool, e.g. before closing it.
    /// Pages that cannot be written back stay buffered.
    pub fn discard_file(&mut self, file: FileHandle) -> FileResult<()> {
        let keys: Vec<BufferKey> = self
            .buffer_pool
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| *key)
            .collect();

        for key in &keys {
            self.flush_page(key.file, key.page_id)?;
        }

        for key in keys {
            if let Some(entry) = self.buffer_pool.pop(&key)
                && entry.pin_count > 0
            {
                warn!(
                    "discarding page {} of file {} with {} outstanding pins",
                    key.page_id,
                    file.as_usize(),
                    entry.pin_count
                );
            }
        }

        self.file_manager.sync_file(file)
    }

    /// Remove an unpinned page from the buffer pool.
    /// Returns false when the page is pinned and was kept.
    pub fn evict_page(&mut self, file: FileHandle, page_id: PageId) -> FileResult<bool> {
        let key = BufferKey { file, page_id };

        match self.buffer_pool.peek(&key) {
            None => return Ok(true),
            Some(entry) if entry.pin_count > 0 => return Ok(false),
            Some(_) => {}
        }

        self.flush_page(file, page_id)?;
        self.buffer_pool.pop(&key);
        Ok(true)
    }

    /// Load a page from disk into the buffer pool, unpinned
    fn load_page(&mut self, key: BufferKey) -> FileResult<()> {
        self.make_room()?;

        if self.load_buffer.len() != PAGE_SIZE {
            self.load_buffer = vec![0u8; PAGE_SIZE];
        }

        self.file_manager
            .read_page(key.file, key.page_id, &mut self.load_buffer)?;

        // Move the loaded bytes into the pool without copying
        let data = std::mem::take(&mut self.load_buffer);

        self.buffer_pool.put(
            key,
            BufferEntry {
                frame: Arc::new(RwLock::new(data)),
                dirty: false,
                pin_count: 0,
            },
        );

        Ok(())
    }

    /// Evict until there is a free frame
    fn make_room(&mut self) -> FileResult<()> {
        while self.buffer_pool.len() >= self.max_pool_size {
            self.evict_lru_page()?;
        }
        Ok(())
    }

    /// Evict the least recently used unpinned page
    fn evict_lru_page(&mut self) -> FileResult<()> {
        // Reverse iteration walks from least to most recently used
        let victim = self
            .buffer_pool
            .iter()
            .rev()
            .find(|(_, entry)| entry.pin_count == 0)
            .map(|(key, _)| *key)
            .ok_or(FileError::BufferPoolFull(self.max_pool_size))?;

        // Write back while still cached; a failed write keeps the only copy
        self.flush_page(victim.file, victim.page_id)?;

        if let Some(entry) = self.buffer_pool.pop(&victim) {
            // Recycle the evicted buffer when nobody else holds the frame
            if let Ok(lock) = Arc::try_unwrap(entry.frame) {
                self.load_buffer = lock.into_inner().unwrap_or_else(PoisonError::into_inner);
            }
        }

        Ok(())
    }

    /// Get the number of pages currently in the buffer pool
    pub fn buffer_pool_size(&self) -> usize {
        self.buffer_pool.len()
    }

    /// Check if a page is in the buffer pool
    pub fn is_page_cached(&self, file: FileHandle, page_id: PageId) -> bool {
        let key = BufferKey { file, page_id };
        self.buffer_pool.contains(&key)
    }

    /// Get the number of dirty pages in the buffer pool
    pub fn dirty_page_count(&self) -> usize {
        self.buffer_pool.iter().filter(|(_, e)| e.dirty).count()
    }

    /// Outstanding pins on a page (0 if not cached)
    pub fn pin_count(&self, file: FileHandle, page_id: PageId) -> usize {
        let key = BufferKey { file, page_id };
        self.buffer_pool.peek(&key).map_or(0, |e| e.pin_count)
    }

    /// Number of cached pages with at least one pin
    pub fn pinned_page_count(&self) -> usize {
        self.buffer_pool
            .iter()
            .filter(|(_, e)| e.pin_count > 0)
            .count()
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        // Flush all dirty pages when the buffer manager is dropped
        let _ = self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_env(capacity: usize) -> (TempDir, BufferManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.db");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        let buffer_manager = BufferManager::with_capacity(file_manager, capacity);

        (temp_dir, buffer_manager, handle)
    }

    fn write_byte(bm: &mut BufferManager, handle: FileHandle, page_id: PageId, value: u8) {
        let frame = bm.fetch_page(handle, page_id).unwrap();
        frame.write().unwrap()[0] = value;
        bm.unpin_page(handle, page_id, true).unwrap();
    }

    fn read_byte(bm: &mut BufferManager, handle: FileHandle, page_id: PageId) -> u8 {
        let frame = bm.fetch_page(handle, page_id).unwrap();
        let value = frame.read().unwrap()[0];
        bm.unpin_page(handle, page_id, false).unwrap();
        value
    }

    #[test]
    fn test_fetch_page_reads_disk() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        bm.file_manager_mut()
            .write_page(handle, 0, &write_buffer)
            .unwrap();

        assert_eq!(read_byte(&mut bm, handle, 0), 42);
        assert_eq!(bm.buffer_pool_size(), 1);
        assert_eq!(bm.pin_count(handle, 0), 0);
    }

    #[test]
    fn test_pin_and_unpin() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        bm.fetch_page(handle, 0).unwrap();
        bm.fetch_page(handle, 0).unwrap();
        assert_eq!(bm.pin_count(handle, 0), 2);
        assert_eq!(bm.buffer_pool_size(), 1);

        bm.unpin_page(handle, 0, false).unwrap();
        bm.unpin_page(handle, 0, false).unwrap();
        assert_eq!(bm.pin_count(handle, 0), 0);
        assert_eq!(bm.dirty_page_count(), 0);

        let result = bm.unpin_page(handle, 0, false);
        assert!(matches!(result, Err(FileError::PageNotPinned(0))));

        let result = bm.unpin_page(handle, 9, false);
        assert!(matches!(result, Err(FileError::PageNotFound(9))));
    }

    #[test]
    fn test_dirty_flag_is_sticky() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        bm.fetch_page(handle, 0).unwrap();
        bm.fetch_page(handle, 0).unwrap();
        bm.unpin_page(handle, 0, true).unwrap();
        bm.unpin_page(handle, 0, false).unwrap();
        assert_eq!(bm.dirty_page_count(), 1);
    }

    #[test]
    fn test_mark_dirty() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        bm.fetch_page(handle, 0).unwrap();
        assert_eq!(bm.dirty_page_count(), 0);

        bm.mark_dirty(handle, 0).unwrap();
        assert_eq!(bm.dirty_page_count(), 1);
        bm.unpin_page(handle, 0, false).unwrap();
        assert_eq!(bm.dirty_page_count(), 1);
    }

    #[test]
    fn test_new_page() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        let (page0, frame) = bm.new_page(handle).unwrap();
        assert_eq!(page0, 0);
        assert!(frame.read().unwrap().iter().all(|&b| b == 0));
        assert_eq!(bm.pin_count(handle, 0), 1);
        assert_eq!(bm.dirty_page_count(), 1);

        let (page1, _) = bm.new_page(handle).unwrap();
        assert_eq!(page1, 1);
        assert_eq!(bm.file_manager_mut().get_page_count(handle).unwrap(), 2);
    }

    #[test]
    fn test_flush_page() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        write_byte(&mut bm, handle, 0, 55);
        assert_eq!(bm.dirty_page_count(), 1);

        bm.flush_page(handle, 0).unwrap();
        assert_eq!(bm.dirty_page_count(), 0);

        assert!(bm.evict_page(handle, 0).unwrap());
        assert_eq!(read_byte(&mut bm, handle, 0), 55);
    }

    #[test]
    fn test_flush_all() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        for i in 0..5 {
            write_byte(&mut bm, handle, i, i as u8);
        }
        assert_eq!(bm.dirty_page_count(), 5);

        bm.flush_all().unwrap();
        assert_eq!(bm.dirty_page_count(), 0);

        for i in 0..5 {
            bm.evict_page(handle, i).unwrap();
            assert_eq!(read_byte(&mut bm, handle, i), i as u8);
        }
    }

    #[test]
    fn test_evict_pinned_page_is_refused() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        bm.fetch_page(handle, 0).unwrap();
        assert!(!bm.evict_page(handle, 0).unwrap());
        assert!(bm.is_page_cached(handle, 0));

        bm.unpin_page(handle, 0, false).unwrap();
        assert!(bm.evict_page(handle, 0).unwrap());
        assert!(!bm.is_page_cached(handle, 0));
    }

    #[test]
    fn test_lru_eviction() {
        let (_temp_dir, mut bm, handle) = setup_test_env(3);

        read_byte(&mut bm, handle, 0);
        read_byte(&mut bm, handle, 1);
        read_byte(&mut bm, handle, 2);
        assert_eq!(bm.buffer_pool_size(), 3);

        // Page 0 is least recently used
        read_byte(&mut bm, handle, 3);
        assert_eq!(bm.buffer_pool_size(), 3);
        assert!(!bm.is_page_cached(handle, 0));
        assert!(bm.is_page_cached(handle, 1));
        assert!(bm.is_page_cached(handle, 2));
        assert!(bm.is_page_cached(handle, 3));
    }

    #[test]
    fn test_lru_skips_pinned_pages() {
        let (_temp_dir, mut bm, handle) = setup_test_env(3);

        // Page 0 stays pinned while it ages
        bm.fetch_page(handle, 0).unwrap();
        read_byte(&mut bm, handle, 1);
        read_byte(&mut bm, handle, 2);

        read_byte(&mut bm, handle, 3);
        assert!(bm.is_page_cached(handle, 0));
        assert!(!bm.is_page_cached(handle, 1));
    }

    #[test]
    fn test_pool_full_when_everything_pinned() {
        let (_temp_dir, mut bm, handle) = setup_test_env(2);

        bm.fetch_page(handle, 0).unwrap();
        bm.fetch_page(handle, 1).unwrap();

        let result = bm.fetch_page(handle, 2);
        assert!(matches!(result, Err(FileError::BufferPoolFull(2))));

        let result = bm.new_page(handle);
        assert!(matches!(result, Err(FileError::BufferPoolFull(2))));
        // No page was appended to the file
        assert_eq!(bm.file_manager_mut().get_page_count(handle).unwrap(), 0);

        bm.unpin_page(handle, 1, false).unwrap();
        assert!(bm.fetch_page(handle, 2).is_ok());
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let (_temp_dir, mut bm, handle) = setup_test_env(2);

        write_byte(&mut bm, handle, 0, 77);

        // Loading two more pages pushes page 0 out
        read_byte(&mut bm, handle, 1);
        read_byte(&mut bm, handle, 2);
        assert!(!bm.is_page_cached(handle, 0));

        assert_eq!(read_byte(&mut bm, handle, 0), 77);
    }

    #[test]
    fn test_failed_write_back_keeps_dirty_page() {
        let (_temp_dir, mut bm, handle) = setup_test_env(1);

        write_byte(&mut bm, handle, 0, 55);

        // Writes to a closed handle fail, so page 0 cannot be evicted
        bm.file_manager_mut().close_file(handle).unwrap();
        assert!(matches!(
            bm.fetch_page(handle, 1),
            Err(FileError::InvalidHandle(_))
        ));

        assert!(bm.is_page_cached(handle, 0));
        assert_eq!(bm.dirty_page_count(), 1);
        assert_eq!(bm.buffer_pool_size(), 1);
    }

    #[test]
    fn test_discard_file() {
        let (_temp_dir, mut bm, handle) = setup_test_env(8);

        write_byte(&mut bm, handle, 0, 12);
        write_byte(&mut bm, handle, 1, 13);

        bm.discard_file(handle).unwrap();
        assert_eq!(bm.buffer_pool_size(), 0);

        assert_eq!(read_byte(&mut bm, handle, 1), 13);
    }

    #[test]
    fn test_multiple_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file1 = temp_dir.path().join("test1.db");
        let file2 = temp_dir.path().join("test2.db");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&file1).unwrap();
        file_manager.create_file(&file2).unwrap();
        let handle1 = file_manager.open_file(&file1).unwrap();
        let handle2 = file_manager.open_file(&file2).unwrap();

        let mut bm = BufferManager::new(file_manager);

        write_byte(&mut bm, handle1, 0, 11);
        write_byte(&mut bm, handle2, 0, 22);

        assert_eq!(read_byte(&mut bm, handle1, 0), 11);
        assert_eq!(read_byte(&mut bm, handle2, 0), 22);
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.db");

        let mut file_manager = PagedFileManager::new();
        file_manager.create_file(&test_file).unwrap();
        let handle = file_manager.open_file(&test_file).unwrap();

        {
            let mut bm = BufferManager::new(file_manager);
            write_byte(&mut bm, handle, 0, 88);
        }

        let mut file_manager = PagedFileManager::new();
        let handle = file_manager.open_file(&test_file).unwrap();
        let mut bm = BufferManager::new(file_manager);
        assert_eq!(read_byte(&mut bm, handle, 0), 88);
    }
}
