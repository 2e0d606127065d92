use serde::{Deserialize, Serialize};

/// Page request. Pages are zero-based; `size == 0` means "everything".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: usize,
    pub size: usize,
}

impl Page {
    pub fn new(page: usize, size: usize) -> Self {
        Page { page, size }
    }

    /// A single page holding every match.
    pub fn all() -> Self {
        Page::default()
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    pub fn limit(&self) -> Option<usize> {
        (self.size > 0).then_some(self.size)
    }
}

/// One page of results plus the total number of matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: Page,
    pub total: u64,
}

impl<T> Paged<T> {
    /// Number of pages at this page size; 1 when unpaged.
    pub fn page_count(&self) -> u64 {
        match self.page.size {
            0 => 1,
            size => self.total.div_ceil(size as u64),
        }
    }

    pub fn has_next(&self) -> bool {
        (self.page.page as u64 + 1) < self.page_count()
    }
}
