//! Offset/limit pagination
//!
//! Every list operation goes through [`paginate`], which slices an
//! insertion-ordered result set and produces `first`/`last`/`next`
//! navigation links.
//!
//! ## Boundary arithmetic
//!
//! ```text
//! first = offset 0
//! last  = offset max(0, total - limit)
//! next  = offset + limit, only while offset + limit < total
//! ```
//!
//! `last` is the start of the final full-width window, not a multiple of
//! `limit`: 4 items at limit 3 give `last` offset 1, not 3. Clients rely on
//! this, so keep it off the `limit * floor((total - 1) / limit)` form.

use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;
use crate::error::{Error, Result};

/// Offset/limit parameters supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }

    pub fn with_offset(offset: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: None,
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            offset: None,
            limit: Some(limit),
        }
    }
}

/// Navigation link to another page of the same listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    pub offset: usize,
    pub limit: usize,
}

impl PageLink {
    fn new(base: &str, offset: usize, limit: usize) -> Self {
        Self {
            href: format!("{base}?offset={offset}&limit={limit}"),
            offset,
            limit,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Items in this page
    pub count: usize,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub first: PageLink,
    pub last: PageLink,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<PageLink>,
}

impl<T> Page<T> {
    /// Transform the items while keeping the navigation envelope
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            total_count: self.total_count,
            offset: self.offset,
            limit: self.limit,
            first: self.first,
            last: self.last,
            next: self.next,
        }
    }
}

/// Resolve the effective limit: default when absent, clamped to the maximum
pub fn effective_limit(request: &PageRequest, config: &PaginationConfig) -> Result<usize> {
    match request.limit {
        None => Ok(config.default_limit),
        Some(0) => Err(Error::validation("limit must be at least 1")),
        Some(limit) => Ok(limit.min(config.max_limit)),
    }
}

/// Slice `items` according to `request` and build the page envelope
///
/// `base` is the path the navigation hrefs point at, e.g.
/// `/instances/i-1/zones`. An offset past the end yields an empty page.
pub fn paginate<T>(
    items: Vec<T>,
    request: &PageRequest,
    config: &PaginationConfig,
    base: &str,
) -> Result<Page<T>> {
    let limit = effective_limit(request, config)?;
    let offset = request.offset.unwrap_or(0);
    let total_count = items.len();

    let page_items: Vec<T> = items.into_iter().skip(offset).take(limit).collect();

    let next = if offset.saturating_add(limit) < total_count {
        Some(PageLink::new(base, offset + limit, limit))
    } else {
        None
    };

    Ok(Page {
        count: page_items.len(),
        items: page_items,
        total_count,
        offset,
        limit,
        first: PageLink::new(base, 0, limit),
        last: PageLink::new(base, total_count.saturating_sub(limit), limit),
        next,
    })
}
