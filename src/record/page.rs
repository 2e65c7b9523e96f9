use super::bitmap;
use super::file_header::{FileHeader, NO_PAGE};
use super::rid::SlotId;
use crate::file::PageId;

/// Page header stored at the beginning of each page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub num_records: u32,                 // 4 bytes - Occupied slots
    pub next_free_page_no: Option<PageId>, // 4 bytes - Free-list link (u32::MAX = none)
}

impl PageHeader {
    pub const SIZE: usize = 8;

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let next = self.next_free_page_no.map_or(NO_PAGE, |p| p as u32);
        let mut result = [0u8; Self::SIZE];
        result[0..4].copy_from_slice(&self.num_records.to_le_bytes());
        result[4..8].copy_from_slice(&next.to_le_bytes());
        result
    }

    /// `data` must hold at least `SIZE` bytes
    pub fn deserialize(data: &[u8]) -> Self {
        let num_records = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let next = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self {
            num_records,
            next_free_page_no: (next != NO_PAGE).then_some(next as PageId),
        }
    }
}

/// Where things live inside a page of one record file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub record_size: usize,
    pub num_records_per_page: usize,
    pub bitmap_size: usize,
}

impl PageLayout {
    fn slot_offset(&self, slot_no: SlotId) -> usize {
        PageHeader::SIZE + self.bitmap_size + slot_no * self.record_size
    }
}

impl From<&FileHeader> for PageLayout {
    fn from(header: &FileHeader) -> Self {
        Self {
            record_size: header.record_size,
            num_records_per_page: header.num_records_per_page,
            bitmap_size: header.bitmap_size,
        }
    }
}

/// Typed view over a pinned page buffer (zero-copy).
///
/// `B` is `&[u8]` for read-only access or `&mut [u8]` for mutation.
/// Slot accessors do not check occupancy; the file handle does.
pub struct PageHandle<B> {
    buffer: B,
    layout: PageLayout,
}

impl<B: AsRef<[u8]>> PageHandle<B> {
    pub fn new(buffer: B, layout: PageLayout) -> Self {
        Self { buffer, layout }
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::deserialize(self.buffer.as_ref())
    }

    pub fn num_records(&self) -> usize {
        self.header().num_records as usize
    }

    pub fn next_free_page_no(&self) -> Option<PageId> {
        self.header().next_free_page_no
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.buffer.as_ref()[PageHeader::SIZE..PageHeader::SIZE + self.layout.bitmap_size]
    }

    pub fn is_occupied(&self, slot_no: SlotId) -> bool {
        bitmap::is_set(self.bitmap(), slot_no)
    }

    /// Lowest free slot, if any
    pub fn first_free_slot(&self) -> Option<SlotId> {
        bitmap::first_bit(false, self.bitmap(), self.layout.num_records_per_page)
    }

    /// First occupied slot at or after `from`
    pub fn next_occupied(&self, from: SlotId) -> Option<SlotId> {
        (from..self.layout.num_records_per_page).find(|&slot_no| self.is_occupied(slot_no))
    }

    /// Number of set bits in the bitmap
    pub fn occupied_count(&self) -> usize {
        bitmap::count_ones(self.bitmap(), self.layout.num_records_per_page)
    }

    pub fn is_full(&self) -> bool {
        self.num_records() >= self.layout.num_records_per_page
    }

    pub fn get_slot(&self, slot_no: SlotId) -> &[u8] {
        let start = self.layout.slot_offset(slot_no);
        &self.buffer.as_ref()[start..start + self.layout.record_size]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PageHandle<B> {
    /// Reset to an empty page linked to `next_free_page_no`
    pub fn init(&mut self, next_free_page_no: Option<PageId>) {
        self.write_header(PageHeader {
            num_records: 0,
            next_free_page_no,
        });
        self.bitmap_mut().fill(0);
    }

    pub fn set_num_records(&mut self, num_records: usize) {
        let mut header = self.header();
        header.num_records = num_records as u32;
        self.write_header(header);
    }

    pub fn set_next_free_page_no(&mut self, next_free_page_no: Option<PageId>) {
        let mut header = self.header();
        header.next_free_page_no = next_free_page_no;
        self.write_header(header);
    }

    pub fn set_occupied(&mut self, slot_no: SlotId) {
        bitmap::set(self.bitmap_mut(), slot_no);
    }

    pub fn clear_occupied(&mut self, slot_no: SlotId) {
        bitmap::reset(self.bitmap_mut(), slot_no);
    }

    pub fn get_slot_mut(&mut self, slot_no: SlotId) -> &mut [u8] {
        let start = self.layout.slot_offset(slot_no);
        let end = start + self.layout.record_size;
        &mut self.buffer.as_mut()[start..end]
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        let end = PageHeader::SIZE + self.layout.bitmap_size;
        &mut self.buffer.as_mut()[PageHeader::SIZE..end]
    }

    fn write_header(&mut self, header: PageHeader) {
        self.buffer.as_mut()[..PageHeader::SIZE].copy_from_slice(&header.serialize());
    }
}
