//! Page/offset pagination.
//!
//! Pages are 1-based. A request for page `< 1` is served page 1 and a
//! request beyond the last page is served the last page. An empty
//! collection is page 1 of 0.

use async_trait::async_trait;
use keystone_core::{Error, PaginationConfig, Result};
use serde::Serialize;

/// What to paginate and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Requested page (1-based; clamped).
    pub page: i64,
    /// Page size; must be positive.
    pub items_per_page: i64,
    /// Known total, if the caller already has it. Skips the count query.
    pub item_count: Option<usize>,
}

impl PageRequest {
    /// Creates a request for `page` with `items_per_page` items.
    pub fn new(page: i64, items_per_page: i64) -> Self {
        Self {
            page,
            items_per_page,
            item_count: None,
        }
    }

    /// Creates a request using the configured default page size.
    pub fn with_defaults(page: i64, config: &PaginationConfig) -> Self {
        Self::new(page, config.default_items_per_page)
    }

    /// Supplies a precomputed total.
    pub fn with_item_count(mut self, item_count: usize) -> Self {
        self.item_count = Some(item_count);
        self
    }

    fn page_size(&self) -> Result<usize> {
        if self.items_per_page <= 0 {
            return Err(Error::invalid_argument(
                "items_per_page",
                format!("must be positive, got {}", self.items_per_page),
            ));
        }
        usize::try_from(self.items_per_page)
            .map_err(|_| Error::invalid_argument("items_per_page", "out of range"))
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::with_defaults(1, &PaginationConfig::default())
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Effective (clamped) page number.
    pub page: i64,
    /// Page size.
    pub items_per_page: i64,
    /// Total items across all pages.
    pub item_count: usize,
    /// Number of pages; `0` for an empty collection.
    pub page_count: i64,
    /// 1-based index of the first item on this page.
    pub first_item: Option<usize>,
    /// 1-based index of the last item on this page.
    pub last_item: Option<usize>,
}

impl<T> Page<T> {
    /// Previous page number, if any.
    pub fn previous_page(&self) -> Option<i64> {
        (self.page > 1).then(|| self.page - 1)
    }

    /// Next page number, if any.
    pub fn next_page(&self) -> Option<i64> {
        (self.page < self.page_count).then(|| self.page + 1)
    }

    /// Returns `true` if a later page exists.
    pub fn has_next(&self) -> bool {
        self.next_page().is_some()
    }

    /// Returns `true` if an earlier page exists.
    pub fn has_previous(&self) -> bool {
        self.previous_page().is_some()
    }

    /// Maps the items, keeping the page layout.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            items_per_page: self.items_per_page,
            item_count: self.item_count,
            page_count: self.page_count,
            first_item: self.first_item,
            last_item: self.last_item,
        }
    }
}

/// Computed position of a page within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    page: i64,
    page_count: i64,
    offset: usize,
    limit: usize,
}

impl Layout {
    fn compute(request: &PageRequest, item_count: usize) -> Result<Self> {
        let limit = request.page_size()?;
        let page_count = i64::try_from(item_count.div_ceil(limit)).unwrap_or(i64::MAX);
        let page = request.page.clamp(1, page_count.max(1));
        let offset = usize::try_from(page - 1)
            .unwrap_or(0)
            .saturating_mul(limit);
        Ok(Self {
            page,
            page_count,
            offset,
            limit,
        })
    }

    fn into_page<T>(self, items: Vec<T>, request: &PageRequest, item_count: usize) -> Page<T> {
        let (first_item, last_item) = if items.is_empty() {
            (None, None)
        } else {
            (
                Some(self.offset + 1),
                Some((self.offset + self.limit).min(item_count)),
            )
        };
        Page {
            items,
            page: self.page,
            items_per_page: request.items_per_page,
            item_count,
            page_count: self.page_count,
            first_item,
            last_item,
        }
    }
}

/// Paginates an in-memory collection.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Result<Page<T>> {
    let item_count = request.item_count.unwrap_or(items.len());
    let layout = Layout::compute(&request, item_count)?;
    let slice: Vec<T> = items
        .into_iter()
        .skip(layout.offset)
        .take(layout.limit)
        .collect();
    Ok(layout.into_page(slice, &request, item_count))
}

/// A collection that can be counted and fetched by offset.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type.
    type Item: Send;

    /// Total number of items.
    async fn count(&self) -> Result<usize>;

    /// Up to `limit` items starting at `offset`.
    async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<Self::Item>>;
}

/// Paginates a [`PageSource`], fetching only the requested page.
pub async fn paginate_source<S>(source: &S, request: PageRequest) -> Result<Page<S::Item>>
where
    S: PageSource + ?Sized,
{
    let item_count = match request.item_count {
        Some(count) => count,
        None => source.count().await?,
    };
    let layout = Layout::compute(&request, item_count)?;
    let items = if item_count == 0 {
        Vec::new()
    } else {
        source.fetch(layout.offset, layout.limit).await?
    };
    log::debug!(
        "Paginated page {}/{} ({} items of {item_count})",
        layout.page,
        layout.page_count,
        items.len()
    );
    Ok(layout.into_page(items, &request, item_count))
}

// ============================================================================
// Tests
// ============================================================================
