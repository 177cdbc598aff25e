//! Page arithmetic for search results.

use crate::service::Record;
use serde::Serialize;

/// Requested page, already clamped: `page >= 1`, `1 <= page_size <= max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationRequest {
    page: u64,
    page_size: u64,
}

impl PaginationRequest {
    /// Out-of-range values are clamped, never rejected.
    pub fn new(page: i64, page_size: i64, max_page_size: u64) -> Self {
        let max = max_page_size.max(1);
        let clamped_page = page.max(1) as u64;
        let clamped_size = (page_size.max(1) as u64).min(max);
        if clamped_page as i64 != page || clamped_size as i64 != page_size {
            tracing::debug!(page, page_size, clamped_page, clamped_size, "pagination clamped");
        }
        PaginationRequest {
            page: clamped_page,
            page_size: clamped_size,
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    /// Rows to skip. Capped so `OFFSET + LIMIT` stays within a PostgreSQL bigint;
    /// a page that far out is past the end either way.
    pub fn offset(&self) -> u64 {
        let cap = (i64::MAX as u64).saturating_sub(self.page_size);
        (self.page - 1).saturating_mul(self.page_size).min(cap)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaginationResult {
    pub data: Vec<Record>,
    pub page: u64,
    #[serde(rename = "pagesize")]
    pub page_size: u64,
    #[serde(rename = "pagecnt")]
    pub page_count: u64,
    pub total: u64,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

/// Page metadata for `total` rows. Pages past the end keep the requested
/// page number and simply carry no data.
pub fn paginate(total: u64, request: &PaginationRequest) -> PaginationResult {
    let page = request.page();
    let page_size = request.page_size();
    let page_count = total.div_ceil(page_size);
    PaginationResult {
        data: Vec::new(),
        page,
        page_size,
        page_count,
        total,
        prev: (page > 1).then(|| page - 1),
        next: (page < page_count).then(|| page + 1),
    }
}

impl PaginationResult {
    pub fn with_data(mut self, data: Vec<Record>) -> Self {
        // rows past the last page are never reported
        if self.page <= self.page_count {
            self.data = data;
        }
        self
    }
}
