//! Count + window execution and the page menu.

use serde::Serialize;
use std::fmt;

use super::compiler::FilterPlan;
use super::error::SearchError;
use crate::db::{AssociationStore, SqlQuery, StoreError};

/// Zero-based start offset and page size. A stride of 0 disables windowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    pub start: u64,
    pub stride: u64,
}

impl PageWindow {
    pub fn new(start: u64, stride: u64) -> Self {
        Self { start, stride }
    }
}

/// One page of results plus the total they were windowed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page_stride: u64,
}

impl<T> SearchResult<T> {
    fn empty(total: u64, page_stride: u64) -> Self {
        Self {
            items: Vec::new(),
            total,
            page_stride,
        }
    }
}

/// Count the plan's matches and fetch one window of them, both against the
/// same snapshot of the store.
pub fn run<S, T, F>(
    store: &S,
    plan: &FilterPlan,
    window: PageWindow,
    fetch: F,
) -> Result<SearchResult<T>, SearchError>
where
    S: AssociationStore,
    F: FnOnce(&S, &SqlQuery) -> Result<Vec<T>, StoreError>,
{
    if plan.matches_nothing() {
        return Ok(SearchResult::empty(0, window.stride));
    }

    store.snapshot(|| -> Result<SearchResult<T>, SearchError> {
        let total = store.count_matches(&plan.count_query())?;
        if window.start >= total {
            return Ok(SearchResult::empty(total, window.stride));
        }
        let items = fetch(store, &plan.page_query(window.start, window.stride))?;
        Ok(SearchResult {
            items,
            total,
            page_stride: window.stride,
        })
    })
}

/// A numbered page link in the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageLink {
    pub page: u64,
    pub offset: u64,
    pub current: bool,
}

/// Navigation menu: first/last shortcuts around up to three pages either side
/// of the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMenu {
    pub pages: Vec<PageLink>,
    /// Offset of the `>>` shortcut, absent when there is nothing to page
    pub last_offset: Option<u64>,
}

const PAGE_SPREAD: u64 = 3;

impl PageMenu {
    pub fn build(offset: u64, stride: u64, max: u64) -> Result<Self, SearchError> {
        if stride == 0 || offset > max {
            return Err(SearchError::InvalidPageWindow { offset, stride, max });
        }
        if max == 0 {
            return Ok(Self {
                pages: vec![PageLink {
                    page: 1,
                    offset: 0,
                    current: true,
                }],
                last_offset: None,
            });
        }

        let last_page = max.div_ceil(stride);
        let current = (offset / stride).saturating_add(1);
        let first_shown = current.saturating_sub(PAGE_SPREAD).max(1);
        let last_shown = last_page.min(current.saturating_add(PAGE_SPREAD));

        let pages = (first_shown..=last_shown)
            .map(|page| PageLink {
                page,
                offset: (page - 1) * stride,
                current: page == current,
            })
            .collect();

        Ok(Self {
            pages,
            last_offset: Some((last_page - 1) * stride),
        })
    }

    pub fn current_page(&self) -> Option<u64> {
        self.pages.iter().find(|p| p.current).map(|p| p.page)
    }
}

impl fmt::Display for PageMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pages: Vec<String> = self
            .pages
            .iter()
            .map(|p| {
                if p.current {
                    format!("[{}]", p.page)
                } else {
                    p.page.to_string()
                }
            })
            .collect();
        match self.last_offset {
            Some(_) => write!(f, "<< {} >>", pages.join(", ")),
            None => f.write_str(&pages.join(", ")),
        }
    }
}
