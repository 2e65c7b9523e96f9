//! Read-only consistency report for a record file.

use serde::Serialize;
use std::collections::HashSet;

use super::error::{RecordError, RecordResult};
use super::file_handle::RecordFileHandle;
use super::file_header::FileHeader;
use super::page::PageHandle;
use crate::file::PageId;

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page_no: PageId,
    /// Count stored in the page header
    pub num_records: usize,
    /// Set bits in the occupancy bitmap
    pub occupied: usize,
    pub next_free_page_no: Option<PageId>,
    pub in_free_list: bool,
    pub full: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub header: FileHeader,
    pub pages: Vec<PageReport>,
    /// Free list in link order, up to the first broken link
    pub free_list: Vec<PageId>,
    /// Why the free-list walk stopped early, if it did
    pub free_list_error: Option<String>,
}

impl FileReport {
    pub fn record_count(&self) -> usize {
        self.pages.iter().map(|p| p.occupied).sum()
    }

    /// Every broken invariant, one message each
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for page in &self.pages {
            if page.num_records != page.occupied {
                violations.push(format!(
                    "page {} counts {} records but {} slots are occupied",
                    page.page_no, page.num_records, page.occupied
                ));
            }
            if page.full && page.in_free_list {
                violations.push(format!("page {} is full but on the free list", page.page_no));
            }
            if !page.full && !page.in_free_list {
                violations.push(format!(
                    "page {} has free slots but is not on the free list",
                    page.page_no
                ));
            }
        }

        if let Some(err) = &self.free_list_error {
            violations.push(err.clone());
        }

        violations
    }
}

impl RecordFileHandle {
    /// Visit every page once and walk the free list
    pub fn inspect(&self) -> RecordResult<FileReport> {
        let header = *self.header();
        let layout = self.layout();

        let mut pages = Vec::with_capacity(header.num_pages);
        for page_no in 0..header.num_pages {
            let page = self.fetch_page_handle(page_no)?;
            let data = page.read();
            let handle = PageHandle::new(&data[..], layout);

            pages.push(PageReport {
                page_no,
                num_records: handle.num_records(),
                occupied: handle.occupied_count(),
                next_free_page_no: handle.next_free_page_no(),
                in_free_list: false,
                full: handle.is_full(),
            });
        }

        let mut free_list = Vec::new();
        let mut free_list_error = None;
        let mut seen = HashSet::new();
        let mut current = header.first_free_page_no;

        while let Some(page_no) = current {
            if page_no >= header.num_pages {
                free_list_error = Some(format!(
                    "free list links to page {} beyond {} pages",
                    page_no, header.num_pages
                ));
                break;
            }
            if !seen.insert(page_no) {
                free_list_error = Some(format!("free list visits page {} twice", page_no));
                break;
            }

            free_list.push(page_no);
            pages[page_no].in_free_list = true;
            current = pages[page_no].next_free_page_no;
        }

        Ok(FileReport {
            header,
            pages,
            free_list,
            free_list_error,
        })
    }

    /// `Internal` listing every violation, if any
    pub fn check_invariants(&self) -> RecordResult<()> {
        let violations = self.inspect()?.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(RecordError::Internal(violations.join("; ")))
        }
    }
}
