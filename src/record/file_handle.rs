use log::{debug, warn};

use super::error::{RecordError, RecordResult};
use super::file_header::FileHeader;
use super::page::{PageHandle, PageLayout};
use super::rid::{Rid, SlotId};
use super::scan::Scan;
use crate::file::{FileHandle, PageId, PinnedPage, SharedBufferManager, lock_shared};

/// An open record file: fixed-length records in slotted pages plus the
/// free-page list threaded through the page headers.
///
/// Every page touched by an operation is held through a `PinnedPage`, so it is
/// unpinned on every return path. The file header is written to disk whenever
/// `num_pages` or `first_free_page_no` changes, as the last step of the change.
pub struct RecordFileHandle {
    fd: FileHandle,
    pool: SharedBufferManager,
    header: FileHeader,
}

impl RecordFileHandle {
    pub(crate) fn new(fd: FileHandle, pool: SharedBufferManager, header: FileHeader) -> Self {
        Self { fd, pool, header }
    }

    pub fn fd(&self) -> FileHandle {
        self.fd
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn record_size(&self) -> usize {
        self.header.record_size
    }

    pub(crate) fn layout(&self) -> PageLayout {
        PageLayout::from(&self.header)
    }

    /// Copy of the record at `rid`
    pub fn get_record(&self, rid: Rid) -> RecordResult<Vec<u8>> {
        let page = self.fetch_page_handle(rid.page_no)?;
        let data = page.read();
        let handle = PageHandle::new(&data[..], self.layout());

        if !self.slot_in_range(rid.slot_no) || !handle.is_occupied(rid.slot_no) {
            return Err(not_found(rid));
        }

        Ok(handle.get_slot(rid.slot_no).to_vec())
    }

    /// Insert into the lowest free slot of the first page on the free list
    pub fn insert_record(&mut self, data: &[u8]) -> RecordResult<Rid> {
        self.check_record_size(data)?;

        let page = self.create_page_handle()?;
        let page_no = page.page_id();
        let layout = self.layout();

        let slot_no = PageHandle::new(&page.read()[..], layout)
            .first_free_slot()
            .ok_or_else(|| {
                RecordError::Internal(format!(
                    "no free slot on page {} taken from the free list",
                    page_no
                ))
            })?;

        let (full, next_free) = Self::fill_slot(&page, layout, slot_no, data);
        if full {
            // The page is the free-list head; pop it
            self.header.first_free_page_no = next_free;
            self.persist_header()?;
            debug!("page {} is full, free list head now {:?}", page_no, next_free);
        }

        Ok(Rid::new(page_no, slot_no))
    }

    /// Insert at a given slot, e.g. when undoing a delete
    pub fn insert_record_at(&mut self, rid: Rid, data: &[u8]) -> RecordResult<()> {
        self.check_record_size(data)?;

        let page = self.fetch_page_handle(rid.page_no)?;
        let layout = self.layout();

        if !self.slot_in_range(rid.slot_no) {
            return Err(RecordError::Internal(format!(
                "slot {} is out of range",
                rid
            )));
        }
        let fills_page = {
            let buffer = page.read();
            let handle = PageHandle::new(&buffer[..], layout);
            if handle.is_occupied(rid.slot_no) {
                return Err(RecordError::Internal(format!(
                    "slot already occupied: {}",
                    rid
                )));
            }
            handle.num_records() + 1 >= layout.num_records_per_page
        };

        // Every page the unlink touches is pinned before the slot is written
        let (position, predecessor) = if fills_page {
            let position = self.locate_free_page(rid.page_no)?;
            let predecessor = match position {
                FreeListPosition::After(prev_no) => Some(self.fetch_page_handle(prev_no)?),
                _ => None,
            };
            (position, predecessor)
        } else {
            (FreeListPosition::Absent, None)
        };

        let (full, next_free) = Self::fill_slot(&page, layout, rid.slot_no, data);
        if full {
            match (position, predecessor) {
                (FreeListPosition::Head, _) => {
                    self.header.first_free_page_no = next_free;
                    self.persist_header()?;
                }
                (FreeListPosition::After(_), Some(prev)) => {
                    PageHandle::new(&mut prev.write()[..], layout).set_next_free_page_no(next_free);
                }
                _ => warn!("full page {} was not on the free list", rid.page_no),
            }
            debug!("page {} left the free list", rid.page_no);
        }

        Ok(())
    }

    /// Remove a record. A page that was full rejoins the free list.
    pub fn delete_record(&mut self, rid: Rid) -> RecordResult<()> {
        let page = self.fetch_page_handle(rid.page_no)?;
        let layout = self.layout();

        let was_full = {
            let buffer = page.read();
            let handle = PageHandle::new(&buffer[..], layout);
            if !self.slot_in_range(rid.slot_no) || !handle.is_occupied(rid.slot_no) {
                return Err(not_found(rid));
            }
            handle.is_full()
        };

        // Walk the free list before touching the page
        let relink = was_full && self.can_link_free_page(rid.page_no)?;

        {
            let mut buffer = page.write();
            let mut handle = PageHandle::new(&mut buffer[..], layout);
            handle.clear_occupied(rid.slot_no);
            let num_records = handle.num_records().saturating_sub(1);
            handle.set_num_records(num_records);
        }

        if relink {
            self.link_free_page(&page)?;
        }

        Ok(())
    }

    /// Overwrite a record in place
    pub fn update_record(&mut self, rid: Rid, data: &[u8]) -> RecordResult<()> {
        self.check_record_size(data)?;

        let page = self.fetch_page_handle(rid.page_no)?;
        let layout = self.layout();

        if !self.slot_in_range(rid.slot_no)
            || !PageHandle::new(&page.read()[..], layout).is_occupied(rid.slot_no)
        {
            return Err(not_found(rid));
        }

        PageHandle::new(&mut page.write()[..], layout)
            .get_slot_mut(rid.slot_no)
            .copy_from_slice(data);

        Ok(())
    }

    /// Forward scan over occupied slots
    pub fn scan(&self) -> RecordResult<Scan<'_>> {
        Scan::new(self)
    }

    /// Pin an existing page. The returned guard owns the pin.
    pub fn fetch_page_handle(&self, page_no: PageId) -> RecordResult<PinnedPage> {
        if page_no >= self.header.num_pages {
            return Err(RecordError::PageNotExist(page_no));
        }

        PinnedPage::fetch(&self.pool, self.fd, page_no).map_err(|e| {
            RecordError::Internal(format!("failed to fetch page {}: {}", page_no, e))
        })
    }

    /// Allocate a page and push it on the free list
    pub fn create_new_page_handle(&mut self) -> RecordResult<PinnedPage> {
        let page = PinnedPage::allocate(&self.pool, self.fd)
            .map_err(|e| RecordError::Internal(format!("failed to allocate page: {}", e)))?;

        let page_no = page.page_id();
        if page_no != self.header.num_pages {
            return Err(RecordError::Internal(format!(
                "buffer pool allocated page {} but the file has {} pages",
                page_no, self.header.num_pages
            )));
        }

        PageHandle::new(&mut page.write()[..], self.layout()).init(self.header.first_free_page_no);

        self.header.num_pages += 1;
        self.header.first_free_page_no = Some(page_no);
        self.persist_header()?;
        page.mark_dirty();

        debug!("created page {} in file {}", page_no, self.fd.as_usize());
        Ok(page)
    }

    /// A pinned page with at least one free slot
    pub fn create_page_handle(&mut self) -> RecordResult<PinnedPage> {
        match self.header.first_free_page_no {
            None => self.create_new_page_handle(),
            Some(page_no) => self.fetch_page_handle(page_no),
        }
    }

    /// Push a page that just stopped being full onto the free list
    pub fn release_page_handle(&mut self, page: &PinnedPage) -> RecordResult<()> {
        if self.can_link_free_page(page.page_id())? {
            self.link_free_page(page)?;
        }
        Ok(())
    }

    /// Write the in-memory header to the header block
    pub fn persist_header(&self) -> RecordResult<()> {
        lock_shared(&self.pool)
            .file_manager_mut()
            .write_header(self.fd, &self.header.serialize())?;
        Ok(())
    }

    /// Persist the header and write back this file's dirty pages
    pub fn flush(&self) -> RecordResult<()> {
        self.persist_header()?;
        lock_shared(&self.pool).flush_file(self.fd)?;
        Ok(())
    }

    /// Copy `data` into a free slot and count it.
    /// Returns whether the page is now full and the free-list link it had;
    /// a full page's link is cleared.
    fn fill_slot(
        page: &PinnedPage,
        layout: PageLayout,
        slot_no: SlotId,
        data: &[u8],
    ) -> (bool, Option<PageId>) {
        let mut buffer = page.write();
        let mut handle = PageHandle::new(&mut buffer[..], layout);

        handle.get_slot_mut(slot_no).copy_from_slice(data);
        handle.set_occupied(slot_no);
        let num_records = handle.num_records() + 1;
        handle.set_num_records(num_records);

        let next_free = handle.next_free_page_no();
        let full = num_records >= layout.num_records_per_page;
        if full {
            handle.set_next_free_page_no(None);
        }
        (full, next_free)
    }

    /// Where `page_no` sits in the free list. At most one other page is
    /// pinned at a time during the walk.
    fn locate_free_page(&self, page_no: PageId) -> RecordResult<FreeListPosition> {
        let layout = self.layout();
        let mut prev = None;
        let mut current = self.header.first_free_page_no;
        let mut steps = 0;

        while let Some(listed) = current {
            if listed == page_no {
                return Ok(prev.map_or(FreeListPosition::Head, FreeListPosition::After));
            }
            if steps >= self.header.num_pages {
                return Err(RecordError::Internal(format!(
                    "free list does not terminate after {} pages",
                    steps
                )));
            }

            let other = self.fetch_page_handle(listed)?;
            current = PageHandle::new(&other.read()[..], layout).next_free_page_no();
            prev = Some(listed);
            steps += 1;
        }

        Ok(FreeListPosition::Absent)
    }

    /// Whether `page_no` may be pushed on the free list. A page already
    /// listed is logged and left where it is.
    fn can_link_free_page(&self, page_no: PageId) -> RecordResult<bool> {
        if self.locate_free_page(page_no)? == FreeListPosition::Absent {
            Ok(true)
        } else {
            warn!("page {} is already on the free list", page_no);
            Ok(false)
        }
    }

    /// Make `page` the free-list head
    fn link_free_page(&mut self, page: &PinnedPage) -> RecordResult<()> {
        let page_no = page.page_id();
        PageHandle::new(&mut page.write()[..], self.layout())
            .set_next_free_page_no(self.header.first_free_page_no);
        self.header.first_free_page_no = Some(page_no);
        self.persist_header()?;

        debug!("page {} rejoined the free list", page_no);
        Ok(())
    }

    fn slot_in_range(&self, slot_no: SlotId) -> bool {
        slot_no < self.header.num_records_per_page
    }

    fn check_record_size(&self, data: &[u8]) -> RecordResult<()> {
        if data.len() != self.header.record_size {
            return Err(RecordError::InvalidRecordSize {
                expected: self.header.record_size,
                actual: data.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FreeListPosition {
    Head,
    /// Linked from the given page
    After(PageId),
    Absent,
}

fn not_found(rid: Rid) -> RecordError {
    RecordError::RecordNotFound {
        page_no: rid.page_no,
        slot_no: rid.slot_no,
    }
}
