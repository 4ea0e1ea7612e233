//! Pagination reconciliation between server metadata and client-side slicing
//!
//! When the response carries a total count, the server is authoritative and
//! the returned records are already the requested page. Otherwise pages are
//! derived from the local record count and the caller slices locally.
//! Requested pages are always clamped, never rejected.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Pagination metadata as reported by (or derived for) a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationDescriptor {
    pub total_count: Option<u64>,
    pub total_pages: Option<u64>,
    pub current_page: u64,
    pub page_size: u64,
}

impl PaginationDescriptor {
    /// Descriptor with no server metadata
    pub fn unpaged(page_size: u64) -> Self {
        Self {
            total_count: None,
            total_pages: None,
            current_page: 1,
            page_size: page_size.max(1),
        }
    }
}

/// Authoritative page state for the render surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledPage {
    pub effective_page: u64,
    pub total_pages: u64,
    pub total_count: u64,
    pub page_size: u64,
    pub is_server_paged: bool,
}

impl ReconciledPage {
    /// Index range of the visible slice within the local record list
    ///
    /// Server-paged responses are shown whole. Client-paged ranges are
    /// clipped to `local_len`, so they never run out of bounds.
    pub fn visible_range(&self, local_len: usize) -> Range<usize> {
        if self.is_server_paged {
            return 0..local_len;
        }
        let size = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        let start = usize::try_from(self.effective_page - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(size)
            .min(local_len);
        let end = start.saturating_add(size).min(local_len);
        start..end
    }

    /// Borrow the visible slice of `records`
    pub fn visible_slice<'a, T>(&self, records: &'a [T]) -> &'a [T] {
        &records[self.visible_range(records.len())]
    }

    pub fn has_previous(&self) -> bool {
        self.effective_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.effective_page < self.total_pages
    }
}

/// Resolve server and client pagination into one page state
pub fn reconcile(
    server: &PaginationDescriptor,
    local_record_count: usize,
    requested_page: i64,
    page_size: u64,
) -> ReconciledPage {
    let page_size = page_size.max(1);

    let (total_count, total_pages, is_server_paged) = match server.total_count {
        Some(count) => {
            let pages = server
                .total_pages
                .unwrap_or_else(|| count.div_ceil(page_size));
            (count, pages.max(1), true)
        }
        None => {
            let count = local_record_count as u64;
            (count, count.div_ceil(page_size).max(1), false)
        }
    };

    ReconciledPage {
        effective_page: clamp_page(requested_page, total_pages),
        total_pages,
        total_count,
        page_size,
        is_server_paged,
    }
}

fn clamp_page(requested: i64, total_pages: u64) -> u64 {
    if requested < 1 {
        return 1;
    }
    (requested as u64).min(total_pages.max(1))
}
