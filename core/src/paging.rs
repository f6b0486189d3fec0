use serde::Serialize;

use crate::ValidationError;

pub const DEFAULT_PREVIEW_SIZE: usize = 5;
pub const MAX_PREVIEW_SIZE: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;
pub const DEFAULT_QUEUE_LIMIT: usize = 50;
pub const MAX_QUEUE_LIMIT: usize = 500;

/// Preview lists default to 5 entries and never exceed 50.
pub fn clamp_preview(size: Option<usize>) -> usize {
    size.unwrap_or(DEFAULT_PREVIEW_SIZE).min(MAX_PREVIEW_SIZE)
}

/// Host-grouped queues take 1..=500 items per call, 50 when unset.
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_QUEUE_LIMIT).clamp(1, MAX_QUEUE_LIMIT)
}

/// 1-based page window. A page past the end is empty, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: usize,
    pub page_size: usize,
}

impl Page {
    pub fn new(page: Option<usize>, page_size: Option<usize>) -> Result<Self, ValidationError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(ValidationError::InvalidPage);
        }
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(Page { page, page_size })
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items.iter().skip(self.offset()).take(self.page_size).cloned().collect()
    }
}
