use std::fmt;

use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPage {
    Page(i64),
    PageSize(i64),
}

impl fmt::Display for InvalidPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidPage::Page(p) => write!(f, "invalid page number {} (must be >= 1)", p),
            InvalidPage::PageSize(s) => write!(f, "invalid page size {} (must be >= 1)", s),
        }
    }
}

impl std::error::Error for InvalidPage {}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Result<Self, InvalidPage> {
        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .ok_or(InvalidPage::Page(page))?;
        let page_size = u32::try_from(page_size)
            .ok()
            .filter(|s| *s >= 1)
            .ok_or(InvalidPage::PageSize(page_size))?;
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of items preceding this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    /// ceil(total_count / page_size); zero when there is nothing to page.
    pub fn total_pages(&self, total_count: u64) -> u64 {
        total_count.div_ceil(u64::from(self.page_size))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE as u32,
            page_size: DEFAULT_PAGE_SIZE as u32,
        }
    }
}

/// One page of results plus the metadata needed to walk the rest.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, request: PageRequest) -> Self {
        Self {
            items,
            total_count,
            page: request.page(),
            page_size: request.page_size(),
            total_pages: request.total_pages(total_count),
        }
    }
}
