use super::error::{RecordError, RecordResult};
use super::file_handle::RecordFileHandle;
use super::page::PageHandle;
use super::rid::{Rid, SlotId};
use crate::file::PageId;

/// Forward-only cursor over the occupied slots of a record file, in
/// `(page_no, slot_no)` order.
///
/// Each page is pinned only while its bitmap is inspected. The scan borrows
/// the file handle, so the file cannot be modified while it is open.
pub struct Scan<'a> {
    file_handle: &'a RecordFileHandle,
    rid: Option<Rid>,
    error: Option<RecordError>,
}

impl<'a> Scan<'a> {
    /// Position at the first occupied slot, or at the end for an empty file
    pub fn new(file_handle: &'a RecordFileHandle) -> RecordResult<Self> {
        let mut scan = Self {
            file_handle,
            rid: None,
            error: None,
        };
        scan.seek(0, 0)?;
        Ok(scan)
    }

    /// Move to the next occupied slot. At the end this is a no-op.
    pub fn advance(&mut self) -> RecordResult<()> {
        match self.rid {
            Some(rid) => self.seek(rid.page_no, rid.slot_no + 1),
            None => Ok(()),
        }
    }

    pub fn is_end(&self) -> bool {
        self.rid.is_none()
    }

    /// Current position; `None` once the scan is exhausted
    pub fn rid(&self) -> Option<Rid> {
        self.rid
    }

    fn seek(&mut self, mut page_no: PageId, mut slot_no: SlotId) -> RecordResult<()> {
        let num_pages = self.file_handle.header().num_pages;
        let layout = self.file_handle.layout();

        while page_no < num_pages {
            let hit = {
                let page = self.file_handle.fetch_page_handle(page_no)?;
                let data = page.read();
                PageHandle::new(&data[..], layout).next_occupied(slot_no)
            };

            if let Some(slot_no) = hit {
                self.rid = Some(Rid::new(page_no, slot_no));
                return Ok(());
            }

            page_no += 1;
            slot_no = 0;
        }

        self.rid = None;
        Ok(())
    }
}

impl Iterator for Scan<'_> {
    type Item = RecordResult<Rid>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.error.take() {
            return Some(Err(err));
        }

        let rid = self.rid?;
        if let Err(err) = self.advance() {
            // Report the failure after the current rid, then stop
            self.rid = None;
            self.error = Some(err);
        }
        Some(Ok(rid))
    }
}
