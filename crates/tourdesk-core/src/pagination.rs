//! Page-at-a-time listings built on `Query`.
//!
//! Each page lives in its own cache slot keyed by prefix, page and page size,
//! so flipping back to a page seen within the TTL is served from cache.
//! The slot holds the whole page including the total, which keeps
//! `total_pages` right on cache hits too.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::QueryCache;
use crate::envelope::{ErrorInfo, Response};
use crate::query::{Fetcher, Query, QueryData, QueryOptions, QueryState, DEFAULT_CACHE_TTL};

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// One page of results plus the size of the whole collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

type PageFn<T> =
    Arc<dyn Fn(u32, u32) -> BoxFuture<'static, anyhow::Result<Response<Page<T>>>> + Send + Sync>;

#[derive(Clone)]
pub struct PaginationOptions {
    pub page_size: u32,
    pub initial_page: u32,
    pub enabled: bool,
    pub key_prefix: String,
    pub cache_ttl: Duration,
    pub on_page_change: Option<Arc<dyn Fn(u32) + Send + Sync>>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            initial_page: 1,
            enabled: true,
            key_prefix: "pagination".to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            on_page_change: None,
        }
    }
}

impl PaginationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn initial_page(mut self, page: u32) -> Self {
        self.initial_page = page.max(1);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn on_page_change(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_page_change = Some(Arc::new(f));
        self
    }
}

pub struct Paginated<T: QueryData> {
    query: Query<Page<T>>,
    current_page: Arc<AtomicU32>,
    total: u64,
    options: PaginationOptions,
}

impl<T: QueryData> Paginated<T> {
    /// `fetch_page(page, page_size)` produces one page; pages are 1-based.
    pub fn new<F, Fut>(cache: QueryCache, fetch_page: F, options: PaginationOptions) -> Self
    where
        F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response<Page<T>>>> + Send + 'static,
    {
        let page_fn: PageFn<T> = Arc::new(move |page, size| fetch_page(page, size).boxed());
        let current_page = Arc::new(AtomicU32::new(options.initial_page.max(1)));
        let page_size = options.page_size.max(1);

        let fetcher = {
            let current_page = Arc::clone(&current_page);
            Fetcher::new(move || page_fn(current_page.load(Ordering::SeqCst), page_size))
        };
        let key = page_key(&options.key_prefix, options.initial_page.max(1), page_size);
        let query_options = QueryOptions::new()
            .enabled(options.enabled)
            .cache_ttl(options.cache_ttl);

        Self {
            query: Query::new(cache, key, fetcher, query_options),
            current_page,
            total: 0,
            options,
        }
    }

    /// Load the current page.
    pub async fn load(&mut self) -> QueryState<Page<T>> {
        let state = self.query.activate().await;
        self.absorb(&state);
        state
    }

    /// Move to `page` and load it. Pages outside `1..=total_pages` are ignored.
    pub async fn go_to_page(&mut self, page: u32) -> bool {
        if page < 1 || page > self.total_pages() {
            debug!(page = page, total_pages = self.total_pages(), "Page out of range, ignoring");
            return false;
        }
        if page == self.page() {
            return true;
        }

        self.current_page.store(page, Ordering::SeqCst);
        let key = page_key(&self.options.key_prefix, page, self.page_size());
        let state = self.query.set_key(key).await;
        self.absorb(&state);

        if let Some(on_page_change) = &self.options.on_page_change {
            on_page_change(page);
        }
        true
    }

    pub async fn next_page(&mut self) -> bool {
        if !self.has_next_page() {
            return false;
        }
        self.go_to_page(self.page() + 1).await
    }

    pub async fn previous_page(&mut self) -> bool {
        if !self.has_previous_page() {
            return false;
        }
        self.go_to_page(self.page() - 1).await
    }

    /// Drop every cached page of this listing and reload the current one.
    pub async fn invalidate(&mut self) -> QueryState<Page<T>> {
        let prefix = format!("{}-", self.options.key_prefix);
        self.query.cache().invalidate_prefix(&prefix);
        let state = self.query.refetch().await;
        self.absorb(&state);
        state
    }

    pub fn items(&self) -> Vec<T> {
        self.query.data().map(|page| page.items).unwrap_or_default()
    }

    pub fn page(&self) -> u32 {
        self.current_page.load(Ordering::SeqCst)
    }

    pub fn page_size(&self) -> u32 {
        self.options.page_size.max(1)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn total_pages(&self) -> u32 {
        self.total.div_ceil(self.page_size() as u64) as u32
    }

    pub fn has_next_page(&self) -> bool {
        self.page() < self.total_pages()
    }

    pub fn has_previous_page(&self) -> bool {
        self.page() > 1
    }

    pub fn is_loading(&self) -> bool {
        self.query.state().is_loading()
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.query.state().error
    }

    pub fn state(&self) -> QueryState<Page<T>> {
        self.query.state()
    }

    fn absorb(&mut self, state: &QueryState<Page<T>>) {
        if let Some(page) = &state.data {
            self.total = page.total;
        }
    }
}

fn page_key(prefix: &str, page: u32, page_size: u32) -> String {
    format!("{}-{}-{}", prefix, page, page_size)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Listing of `total` numbers served in pages, counting fetches.
    fn listing(
        total: u32,
        options: PaginationOptions,
    ) -> (Paginated<u32>, QueryCache, Arc<AtomicUsize>) {
        let cache = QueryCache::new(Arc::new(ManualClock::at_epoch()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let paginated = Paginated::new(
            cache.clone(),
            move |page: u32, size: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                let start = (page - 1) * size + 1;
                let end = (start + size - 1).min(total);
                let items: Vec<u32> = (start..=end).collect();
                async move {
                    Ok(Response::Raw(Page {
                        items,
                        total: total as u64,
                    }))
                }
            },
            options,
        );
        (paginated, cache, calls)
    }

    #[tokio::test]
    async fn test_first_page_derives_counts() {
        let (mut paginated, _cache, calls) = listing(25, PaginationOptions::new());
        paginated.load().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(paginated.items(), (1..=10).collect::<Vec<_>>());
        assert_eq!(paginated.total(), 25);
        assert_eq!(paginated.total_pages(), 3);
        assert!(paginated.has_next_page());
        assert!(!paginated.has_previous_page());
    }

    #[tokio::test]
    async fn test_out_of_range_pages_are_noops() {
        let (mut paginated, _cache, calls) = listing(25, PaginationOptions::new());
        paginated.load().await;

        assert!(!paginated.go_to_page(0).await);
        assert!(!paginated.go_to_page(paginated.total_pages() + 1).await);
        assert_eq!(paginated.page(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!paginated.previous_page().await);
        assert_eq!(paginated.page(), 1);
    }

    #[tokio::test]
    async fn test_pages_get_their_own_cache_slots() {
        let (mut paginated, cache, calls) = listing(25, PaginationOptions::new());
        paginated.load().await;

        assert!(paginated.next_page().await);
        assert!(paginated.next_page().await);
        assert_eq!(paginated.page(), 3);
        assert_eq!(paginated.items(), (21..=25).collect::<Vec<_>>());
        assert!(!paginated.has_next_page());
        assert!(!paginated.next_page().await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            cache.keys(),
            vec!["pagination-1-10", "pagination-2-10", "pagination-3-10"]
        );

        // Back to page 1 is a cache hit and the total is still known.
        assert!(paginated.go_to_page(1).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(paginated.total(), 25);
        assert_eq!(paginated.items(), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_on_page_change_reports_new_page() {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let options = PaginationOptions::new()
            .page_size(5)
            .key_prefix("tours")
            .on_page_change(move |page| sink.lock().unwrap().push(page));
        let (mut paginated, cache, _calls) = listing(12, options);
        paginated.load().await;

        paginated.go_to_page(3).await;
        assert_eq!(*changes.lock().unwrap(), vec![3]);
        assert_eq!(paginated.items(), vec![11, 12]);
        assert!(cache.get("tours-3-5").is_some());
    }

    #[tokio::test]
    async fn test_invalidate_drops_all_pages() {
        let (mut paginated, cache, calls) = listing(25, PaginationOptions::new());
        paginated.load().await;
        paginated.next_page().await;

        paginated.invalidate().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.keys(), vec!["pagination-2-10"]);
    }

    #[tokio::test]
    async fn test_empty_listing_has_no_pages() {
        let (mut paginated, _cache, _calls) = listing(0, PaginationOptions::new());
        paginated.load().await;
        assert_eq!(paginated.total_pages(), 0);
        assert!(!paginated.has_next_page());
        assert!(!paginated.go_to_page(1).await);
    }
}
