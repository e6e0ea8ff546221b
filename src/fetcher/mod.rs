//! Page sources and the pagination loop
//!
//! A [`PageSource`] fetches one page of results for a target at a cursor.
//! [`PaginatedCollector`] drives a source until the listing is exhausted,
//! a budget is met, or something goes wrong.

use crate::error::CrawlResult;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

pub mod http;
pub mod json_source;
pub mod pagination;

pub use http::HttpTransport;
pub use json_source::{JsonCursorSource, JsonSourceConfig};
pub use pagination::{Collection, CollectionEnd, MalformedPagePolicy, PaginatedCollector};

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T, C> {
    /// `false` when the endpoint flagged a business failure
    pub success: bool,
    /// Endpoint message, mostly useful on failure
    pub message: String,
    /// Items in endpoint order
    pub items: Vec<T>,
    /// Where the next page starts
    pub next_cursor: Option<C>,
    /// Whether the endpoint reports further pages
    pub has_more: bool,
}

impl<T, C> Page<T, C> {
    /// A page followed by more pages starting at `cursor`
    pub fn next(items: Vec<T>, cursor: C) -> Self {
        Self {
            success: true,
            message: String::new(),
            items,
            next_cursor: Some(cursor),
            has_more: true,
        }
    }

    /// The final page
    pub fn last(items: Vec<T>) -> Self {
        Self {
            success: true,
            message: String::new(),
            items,
            next_cursor: None,
            has_more: false,
        }
    }

    /// A business failure reported by the endpoint
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }

    /// Claims more pages but gives no way to reach them
    pub fn is_malformed(&self) -> bool {
        self.success && self.has_more && self.next_cursor.is_none()
    }
}

/// Fetches one page of a listing for a crawl target
///
/// Implementations translate transport failures into [`crate::CrawlError`];
/// a payload that cannot be interpreted should be reported as
/// [`crate::CrawlError::Data`].
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type produced by this source
    type Item: Send;
    /// Opaque continuation value; `Default` is the first page
    type Cursor: Clone + Default + Debug + Send + Sync;

    /// Fetch the page of `target` starting at `cursor`
    async fn fetch_page(
        &self,
        target: &str,
        cursor: &Self::Cursor,
    ) -> CrawlResult<Page<Self::Item, Self::Cursor>>;
}

/// [`PageSource`] backed by a closure, see [`from_fn`]
pub struct FnSource<F, T, C> {
    fetch: F,
    _marker: PhantomData<fn() -> (T, C)>,
}

/// Wrap `fetch(target, cursor)` as a [`PageSource`]
pub fn from_fn<F, Fut, T, C>(fetch: F) -> FnSource<F, T, C>
where
    F: Fn(String, C) -> Fut + Send + Sync,
    Fut: Future<Output = CrawlResult<Page<T, C>>> + Send + 'static,
{
    FnSource {
        fetch,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, T, C> PageSource for FnSource<F, T, C>
where
    F: Fn(String, C) -> Fut + Send + Sync,
    Fut: Future<Output = CrawlResult<Page<T, C>>> + Send + 'static,
    T: Send + 'static,
    C: Clone + Default + Debug + Send + Sync + 'static,
{
    type Item = T;
    type Cursor = C;

    async fn fetch_page(&self, target: &str, cursor: &C) -> CrawlResult<Page<T, C>> {
        (self.fetch)(target.to_string(), cursor.clone()).await
    }
}
