//! Infinite scrolling: pages appended to one growing list.
//!
//! The list advances when its sentinel (the "you reached the bottom" signal
//! from the UI) becomes visible and another page is known to exist. A page
//! shorter than the page size marks the end of the collection.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use tracing::debug;

use crate::cache::QueryCache;
use crate::envelope::{ErrorInfo, Response};
use crate::pagination::DEFAULT_PAGE_SIZE;
use crate::query::{Fetcher, Query, QueryData, QueryOptions, QueryState, DEFAULT_CACHE_TTL};

type PageFn<T> = Arc<dyn Fn(u32) -> BoxFuture<'static, anyhow::Result<Response<Vec<T>>>> + Send + Sync>;

#[derive(Clone)]
pub struct InfiniteOptions {
    pub page_size: u32,
    pub enabled: bool,
    /// Whether a first page is expected at all.
    pub has_next_page: bool,
    pub key_prefix: String,
    pub cache_ttl: Duration,
    pub on_load_more: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for InfiniteOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            enabled: true,
            has_next_page: true,
            key_prefix: "infinite-scroll".to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            on_load_more: None,
        }
    }
}

impl InfiniteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn has_next_page(mut self, has_next_page: bool) -> Self {
        self.has_next_page = has_next_page;
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

    pub fn on_load_more(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_load_more = Some(Arc::new(f));
        self
    }
}

pub struct InfiniteList<T: QueryData> {
    query: Query<Vec<T>>,
    current_page: Arc<AtomicU32>,
    /// Highest page whose items are already in `items`.
    appended_through: u32,
    items: Vec<T>,
    has_next_page: bool,
    options: InfiniteOptions,
}

impl<T: QueryData> InfiniteList<T> {
    /// `fetch_page(page)` produces the items of one 1-based page.
    pub fn new<F, Fut>(cache: QueryCache, fetch_page: F, options: InfiniteOptions) -> Self
    where
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response<Vec<T>>>> + Send + 'static,
    {
        let page_fn: PageFn<T> = Arc::new(move |page| fetch_page(page).boxed());
        let current_page = Arc::new(AtomicU32::new(1));

        let fetcher = {
            let current_page = Arc::clone(&current_page);
            Fetcher::new(move || page_fn(current_page.load(Ordering::SeqCst)))
        };
        let query_options = QueryOptions::new()
            .enabled(options.enabled && options.has_next_page)
            .cache_ttl(options.cache_ttl);

        Self {
            query: Query::new(cache, page_key(&options.key_prefix, 1), fetcher, query_options),
            current_page,
            appended_through: 0,
            items: Vec::new(),
            has_next_page: options.has_next_page,
            options,
        }
    }

    /// Load the current page if it is not in the list yet.
    pub async fn load(&mut self) -> QueryState<Vec<T>> {
        if !self.options.enabled || self.page() <= self.appended_through {
            return self.query.state();
        }
        let state = self.query.activate().await;
        self.absorb(&state);
        state
    }

    /// Sentinel visibility changed. Advances to the next page when it came
    /// into view, nothing is loading and more pages exist.
    pub async fn on_sentinel(&mut self, visible: bool) -> bool {
        if !visible || !self.options.enabled || !self.has_next_page || self.is_loading() {
            return false;
        }
        if self.page() > self.appended_through {
            // The current page never made it in; retry it instead of skipping ahead.
            self.load().await;
            return true;
        }

        let next = self.page() + 1;
        self.current_page.store(next, Ordering::SeqCst);
        debug!(page = next, "Loading next page");
        let state = self.query.set_key(page_key(&self.options.key_prefix, next)).await;
        self.absorb(&state);
        true
    }

    /// Feed sentinel signals until the stream ends or the list is complete.
    pub async fn follow<S>(&mut self, signals: S)
    where
        S: Stream<Item = bool> + Unpin,
    {
        let mut signals = signals;
        while let Some(visible) = signals.next().await {
            self.on_sentinel(visible).await;
            if !self.has_next_page {
                debug!(items = self.items.len(), "Reached the end of the list");
                break;
            }
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn page(&self) -> u32 {
        self.current_page.load(Ordering::SeqCst)
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn is_loading(&self) -> bool {
        self.query.state().is_loading() && self.page() > self.appended_through && self.options.enabled
    }

    pub fn error(&self) -> Option<ErrorInfo> {
        self.query.state().error
    }

    fn absorb(&mut self, state: &QueryState<Vec<T>>) {
        if !state.is_success() || self.page() <= self.appended_through {
            return;
        }
        let Some(new_items) = &state.data else {
            return;
        };

        self.has_next_page = new_items.len() >= self.options.page_size as usize;
        self.items.extend(new_items.iter().cloned());
        self.appended_through = self.page();
        debug!(
            page = self.page(),
            received = new_items.len(),
            total = self.items.len(),
            has_next_page = self.has_next_page,
            "Page appended"
        );

        if let Some(on_load_more) = &self.options.on_load_more {
            on_load_more();
        }
    }
}

fn page_key(prefix: &str, page: u32) -> String {
    format!("{}-{}", prefix, page)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    /// Pages of the given sizes, items numbered consecutively.
    fn list_of_pages(
        sizes: Vec<u32>,
        options: InfiniteOptions,
    ) -> (InfiniteList<u32>, Arc<AtomicUsize>) {
        let cache = QueryCache::new(Arc::new(ManualClock::at_epoch()));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let list = InfiniteList::new(
            cache,
            move |page: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                let index = (page - 1) as usize;
                let offset: u32 = sizes.iter().take(index).sum();
                let size = sizes.get(index).copied().unwrap_or(0);
                let items: Vec<u32> = (offset + 1..=offset + size).collect();
                async move { Ok(Response::Raw(items)) }
            },
            options,
        );
        (list, calls)
    }

    #[tokio::test]
    async fn test_short_page_ends_the_list() {
        let (mut list, calls) = list_of_pages(vec![10, 4], InfiniteOptions::new().page_size(10));

        list.load().await;
        assert_eq!(list.items().len(), 10);
        assert!(list.has_next_page());

        assert!(list.on_sentinel(true).await);
        assert_eq!(list.page(), 2);
        assert_eq!(list.items().len(), 14);
        assert_eq!(list.items(), (1..=14).collect::<Vec<_>>().as_slice());
        assert!(!list.has_next_page());

        // Nothing more to load.
        assert!(!list.on_sentinel(true).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hidden_sentinel_does_not_advance() {
        let (mut list, calls) = list_of_pages(vec![10, 10], InfiniteOptions::new());
        list.load().await;
        assert!(!list.on_sentinel(false).await);
        assert_eq!(list.page(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_load_does_not_duplicate() {
        let (mut list, _calls) = list_of_pages(vec![3], InfiniteOptions::new().page_size(3));
        list.load().await;
        list.load().await;
        assert_eq!(list.items(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_no_initial_page_means_no_fetch() {
        let (mut list, calls) =
            list_of_pages(vec![10], InfiniteOptions::new().has_next_page(false));
        list.load().await;
        assert!(!list.on_sentinel(true).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(list.items().is_empty());
    }

    #[tokio::test]
    async fn test_follow_stops_at_end() {
        let loads = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&loads);
        let options = InfiniteOptions::new()
            .page_size(2)
            .on_load_more(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let (mut list, calls) = list_of_pages(vec![2, 2, 1], options);
        list.load().await;

        let signals = futures::stream::iter(vec![true, false, true, true, true, true]);
        list.follow(signals).await;

        assert_eq!(list.items(), &[1, 2, 3, 4, 5]);
        assert!(!list.has_next_page());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(loads.load(Ordering::SeqCst), 3);
    }
}
