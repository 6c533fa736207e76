//! Page-number pagination for list endpoints.
//!
//! Pages are 1-based. The page size defaults to 10 and is clamped to 1..=100.
//!
//! # Usage
//!
//! ```rust,ignore
//! let page = PageArgs { page: Some(2), page_size: Some(20) }.validate()?;
//! let (tasks, total) = Task::list(&filter, &page, &pool).await?;
//! ```

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw pagination input, typically taken from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageArgs {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageArgs {
    pub fn new(page: i64, page_size: i64) -> Self {
        PageArgs {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Apply defaults and bounds.
    pub fn validate(&self) -> Result<ValidatedPage, &'static str> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err("page must be at least 1");
        }

        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        if (page - 1).checked_mul(page_size).is_none() {
            return Err("page is out of range");
        }

        Ok(ValidatedPage { page, page_size })
    }
}

/// Normalized pagination arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedPage {
    pub page: i64,
    pub page_size: i64,
}

impl ValidatedPage {
    /// SQL `LIMIT` value.
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// SQL `OFFSET` value.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

impl Default for ValidatedPage {
    fn default() -> Self {
        ValidatedPage {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, args: &ValidatedPage) -> Self {
        Page {
            items,
            total,
            page: args.page,
            page_size: args.page_size,
        }
    }
}
