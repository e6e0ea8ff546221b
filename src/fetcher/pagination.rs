//! Cursor pagination loop
//!
//! Drives a [`PageSource`] for one target and accumulates items in page
//! order. The loop stops on the first of:
//! - the endpoint reporting no further pages, or an empty page
//! - the caller's item budget being met (the result is truncated to it)
//! - a business failure or unrecoverable error (partial items are returned)
//! - a malformed page, handled per [`MalformedPagePolicy`]
//! - shutdown, or the page limit safety valve

use super::{Page, PageSource};
use crate::crawler::config::MAX_PAGES;
use crate::crawler::rate_limit::RateLimiter;
use crate::error::{CrawlError, CrawlResult, RetryPolicy};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with a page that claims more results but cannot be followed,
/// or whose payload could not be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPagePolicy {
    /// Stop and report success with what was collected
    #[default]
    Terminate,
    /// Stop and report the collection as incomplete
    Incomplete,
}

/// Why a collection stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionEnd {
    /// Endpoint reported the last page
    Exhausted,
    /// Item budget met
    BudgetReached,
    /// Malformed page encountered
    Malformed,
    /// Business failure or error
    Failed,
    /// Shutdown requested
    Cancelled,
    /// Safety valve on page count tripped
    PageLimit,
}

/// Result of one collection
#[derive(Debug, Clone)]
pub struct Collection<T> {
    /// Items in endpoint order
    pub items: Vec<T>,
    /// Whether the collection counts as successful
    pub success: bool,
    /// Summary or failure message
    pub message: String,
    /// Why the loop stopped
    pub end: CollectionEnd,
    /// Pages fetched
    pub pages: usize,
    /// Error behind a failed collection, if any
    pub error: Option<CrawlError>,
}

impl<T> Collection<T> {
    fn finish(items: Vec<T>, pages: usize, end: CollectionEnd) -> Self {
        let message = format!("collected {} items in {} pages", items.len(), pages);
        Self {
            items,
            success: true,
            message,
            end,
            pages,
            error: None,
        }
    }

    fn fail(items: Vec<T>, pages: usize, end: CollectionEnd, error: CrawlError) -> Self {
        Self {
            items,
            success: false,
            message: error.to_string(),
            end,
            pages,
            error: Some(error),
        }
    }
}

/// Cursor-following collector over a [`PageSource`]
pub struct PaginatedCollector<S: PageSource> {
    source: S,
    limiter: Option<Arc<RateLimiter>>,
    retry: Option<RetryPolicy>,
    shutdown: Option<SharedShutdown>,
    malformed_policy: MalformedPagePolicy,
    max_pages: usize,
}

impl<S: PageSource> PaginatedCollector<S> {
    /// Collector with no limiter, no retries and the default page limit
    pub fn new(source: S) -> Self {
        Self {
            source,
            limiter: None,
            retry: None,
            shutdown: None,
            malformed_policy: MalformedPagePolicy::default(),
            max_pages: MAX_PAGES,
        }
    }

    /// Acquire `limiter` before every fetch
    ///
    /// Only needed for sources that do not throttle themselves.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Wrap every fetch in `policy`
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Check `shutdown` before every fetch
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Choose how malformed pages end the loop
    pub fn with_malformed_policy(mut self, policy: MalformedPagePolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    /// Cap the number of fetches per collection
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Underlying source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Collect `target` from the first page
    pub async fn collect(&self, target: &str, budget: Option<usize>) -> Collection<S::Item> {
        self.collect_from(target, S::Cursor::default(), budget).await
    }

    /// Collect `target` starting at `start`
    pub async fn collect_from(
        &self,
        target: &str,
        start: S::Cursor,
        budget: Option<usize>,
    ) -> Collection<S::Item> {
        let mut items = Vec::new();
        let mut cursor = start;
        let mut pages = 0;

        if budget == Some(0) {
            return Collection::finish(items, pages, CollectionEnd::BudgetReached);
        }

        loop {
            if self
                .shutdown
                .as_ref()
                .is_some_and(|s| s.is_shutdown_requested())
            {
                info!(crawl_target = %target, pages, items = items.len(), "Collection cancelled");
                return Collection::fail(items, pages, CollectionEnd::Cancelled, CrawlError::Cancelled);
            }

            if pages >= self.max_pages {
                warn!(
                    crawl_target = %target,
                    max_pages = self.max_pages,
                    cursor = ?cursor,
                    "Page limit reached - possible endless pagination"
                );
                let err = CrawlError::Data(format!(
                    "page limit ({}) reached for {target}",
                    self.max_pages
                ));
                return Collection::fail(items, pages, CollectionEnd::PageLimit, err);
            }

            debug!(crawl_target = %target, page = pages + 1, cursor = ?cursor, "Fetching page");

            let page = match self.fetch(target, &cursor).await {
                Ok(page) => page,
                Err(CrawlError::Data(message)) => {
                    return self.malformed(target, items, pages, message);
                }
                Err(CrawlError::Cancelled) => {
                    return Collection::fail(items, pages, CollectionEnd::Cancelled, CrawlError::Cancelled);
                }
                Err(err) => {
                    warn!(crawl_target = %target, pages, error = %err, "Collection failed");
                    return Collection::fail(items, pages, CollectionEnd::Failed, err);
                }
            };
            pages += 1;
            metrics::record_page(page.items.len());

            if !page.success {
                warn!(crawl_target = %target, pages, message = %page.message, "Endpoint reported failure");
                let err = CrawlError::business(page.message);
                return Collection::fail(items, pages, CollectionEnd::Failed, err);
            }

            let Page {
                items: page_items,
                next_cursor,
                has_more,
                ..
            } = page;
            let empty = page_items.is_empty();
            debug!(crawl_target = %target, page = pages, received = page_items.len(), "Received page");
            items.extend(page_items);

            if let Some(budget) = budget {
                if items.len() >= budget {
                    items.truncate(budget);
                    debug!(crawl_target = %target, budget, "Item budget reached");
                    return Collection::finish(items, pages, CollectionEnd::BudgetReached);
                }
            }

            if !has_more || empty {
                debug!(crawl_target = %target, pages, total = items.len(), "Pagination complete");
                return Collection::finish(items, pages, CollectionEnd::Exhausted);
            }

            match next_cursor {
                Some(next) => cursor = next,
                None => {
                    let message = "page reports more results but carries no cursor".to_string();
                    return self.malformed(target, items, pages, message);
                }
            }
        }
    }

    async fn fetch(&self, target: &str, cursor: &S::Cursor) -> CrawlResult<Page<S::Item, S::Cursor>> {
        let attempt = move || async move {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }
            self.source.fetch_page(target, cursor).await
        };
        match &self.retry {
            Some(policy) => policy.run(target, attempt).await,
            None => attempt().await,
        }
    }

    fn malformed(
        &self,
        target: &str,
        items: Vec<S::Item>,
        pages: usize,
        message: String,
    ) -> Collection<S::Item> {
        warn!(
            crawl_target = %target,
            pages,
            collected = items.len(),
            policy = ?self.malformed_policy,
            "Malformed page: {message}"
        );
        match self.malformed_policy {
            MalformedPagePolicy::Terminate => {
                let mut collection = Collection::finish(items, pages, CollectionEnd::Malformed);
                collection.message = format!("{}; stopped at malformed page: {message}", collection.message);
                collection
            }
            MalformedPagePolicy::Incomplete => {
                let err = CrawlError::Data(message);
                let mut collection = Collection::fail(items, pages, CollectionEnd::Malformed, err);
                collection.message = format!("incomplete: {}", collection.message);
                collection
            }
        }
    }
}
