use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::cache::QueryCache;
use crate::envelope::ErrorInfo;

use super::{Fetcher, QueryData, QueryOptions, QueryState, QueryStatus, DEFAULT_QUERY_ERROR};

/// Shared part of a consumer, reachable from its refetch timer task.
struct QueryInner<T> {
    cache: QueryCache,
    key: RwLock<String>,
    fetcher: RwLock<Fetcher<T>>,
    options: QueryOptions<T>,
    enabled: AtomicBool,
    /// Latest issued generation. Also serializes "check generation, then write".
    generation: Mutex<u64>,
    state: watch::Sender<QueryState<T>>,
}

impl<T: QueryData> QueryInner<T> {
    fn key(&self) -> String {
        self.key.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn fetcher(&self) -> Fetcher<T> {
        self.fetcher.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn snapshot(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }

    /// Issue a new generation, superseding anything still in flight.
    fn bump_generation(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        *generation
    }

    fn notify_success(&self, data: &T) {
        if let Some(on_success) = &self.options.on_success {
            on_success(data);
        }
    }

    fn notify_error(&self, error: &ErrorInfo) {
        if let Some(on_error) = &self.options.on_error {
            on_error(error);
        }
    }

    /// Serve a fresh cache entry, or fall through to a fetch.
    async fn load(&self) -> QueryState<T> {
        let key = self.key();
        if let Some(data) = self.cache.get_fresh_as::<T>(&key, self.options.cache_ttl) {
            debug!(key = %key, "Query served from cache");
            {
                let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
                *generation += 1;
                self.state.send_replace(QueryState::success(data.clone()));
            }
            self.notify_success(&data);
            return self.snapshot();
        }
        self.fetch().await
    }

    /// Call the fetcher regardless of freshness.
    async fn fetch(&self) -> QueryState<T> {
        let issued = self.bump_generation();
        let key = self.key();
        let fetcher = self.fetcher();

        self.state.send_modify(|state| state.status = QueryStatus::Loading);
        debug!(key = %key, generation = issued, "Query fetch started");

        let outcome = fetcher
            .call()
            .await
            .and_then(|response| response.into_payload().map_err(anyhow::Error::from));

        match outcome {
            Ok(data) => {
                {
                    let generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
                    if *generation != issued {
                        debug!(key = %key, generation = issued, latest = *generation, "Discarding superseded fetch result");
                        return self.snapshot();
                    }
                    if let Err(e) = self.cache.set_typed(&key, &data) {
                        warn!(key = %key, error = %e, "Failed to cache query result");
                    }
                    self.state.send_replace(QueryState::success(data.clone()));
                }
                debug!(key = %key, "Query fetch succeeded");
                self.notify_success(&data);
            }
            Err(e) => {
                let info = ErrorInfo::from_rejection(&e, DEFAULT_QUERY_ERROR);
                {
                    let generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
                    if *generation != issued {
                        debug!(key = %key, generation = issued, latest = *generation, "Discarding superseded fetch error");
                        return self.snapshot();
                    }
                    self.state.send_replace(QueryState::failure(info.clone()));
                }
                warn!(key = %key, error = %info, "Query fetch failed");
                self.notify_error(&info);
            }
        }

        self.snapshot()
    }

    /// Compute the next value from the current one and write it. Reading,
    /// computing and writing all happen under the generation lock, so no
    /// fetch result can land in between. `updater` must not call back into
    /// this consumer's write paths.
    fn set_data_with(&self, updater: impl FnOnce(Option<&T>) -> T) {
        let key = self.key();
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let (current, was_success) = {
            let state = self.state.borrow();
            (state.data.clone(), state.is_success())
        };
        let data = updater(current.as_ref());

        let json = match serde_json::to_value(&data) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Query data could not be serialized, cache left untouched");
                *generation += 1;
                self.state.send_replace(QueryState::success(data));
                return;
            }
        };

        let state_unchanged = was_success
            && current
                .as_ref()
                .and_then(|current| serde_json::to_value(current).ok())
                .is_some_and(|current| current == json);
        if state_unchanged && self.cache.get(&key).is_some_and(|entry| entry.value == json) {
            return;
        }

        *generation += 1;
        self.cache.set(&key, json);
        self.state.send_replace(QueryState::success(data));
        debug!(key = %key, "Query data set locally");
    }
}

/// One consumer of one cache key.
///
/// Fetch failures never escape a `Query`: they land in its state
/// (`is_error()` / `error`) and in the `on_error` callback.
pub struct Query<T: QueryData> {
    inner: Arc<QueryInner<T>>,
    refetch_task: Option<JoinHandle<()>>,
}

impl<T: QueryData> Query<T> {
    pub fn new(
        cache: QueryCache,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        mut options: QueryOptions<T>,
    ) -> Self {
        let enabled = options.enabled;
        let (state, _) = watch::channel(QueryState::initial(options.initial_data.take(), enabled));

        Self {
            inner: Arc::new(QueryInner {
                cache,
                key: RwLock::new(key.into()),
                fetcher: RwLock::new(fetcher),
                options,
                enabled: AtomicBool::new(enabled),
                generation: Mutex::new(0),
                state,
            }),
            refetch_task: None,
        }
    }

    /// Build and activate in one step.
    pub async fn start(
        cache: QueryCache,
        key: impl Into<String>,
        fetcher: Fetcher<T>,
        options: QueryOptions<T>,
    ) -> Self {
        let mut query = Self::new(cache, key, fetcher, options);
        query.activate().await;
        query
    }

    pub fn key(&self) -> String {
        self.inner.key()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> QueryState<T> {
        self.inner.snapshot()
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state.borrow().data.clone()
    }

    /// Receiver that observes every state transition of this consumer.
    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.inner.state.subscribe()
    }

    /// Load the key (cache first) and start the refetch timer if configured.
    /// Does nothing while disabled.
    pub async fn activate(&mut self) -> QueryState<T> {
        if !self.is_enabled() {
            return self.state();
        }
        let state = self.inner.load().await;
        self.schedule_refetch();
        state
    }

    /// Freshness-checked read: cache hit if younger than the TTL, else fetch.
    pub async fn load(&self) -> QueryState<T> {
        self.inner.load().await
    }

    /// Fetch now, ignoring any cached entry.
    pub async fn refetch(&self) -> QueryState<T> {
        self.inner.fetch().await
    }

    /// Drop the cached entry for this key, then fetch.
    pub async fn invalidate(&self) -> QueryState<T> {
        self.inner.cache.delete(&self.inner.key());
        self.inner.fetch().await
    }

    /// Replace the data locally and in the cache without calling the fetcher.
    /// Setting the value already held is a no-op.
    pub fn set_query_data(&self, data: T) {
        self.inner.set_data_with(|_| data);
    }

    /// Like `set_query_data`, computing the new value from the current one.
    /// No fetch result lands while `updater` runs; it must not write to this
    /// consumer itself.
    pub fn update_query_data(&self, updater: impl FnOnce(Option<&T>) -> T) {
        self.inner.set_data_with(updater);
    }

    /// Turn the consumer on or off. Turning it on activates it; turning it
    /// off stops the refetch timer.
    pub async fn set_enabled(&mut self, enabled: bool) -> QueryState<T> {
        let was_enabled = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if enabled && !was_enabled {
            return self.activate().await;
        }
        if !enabled {
            self.cancel_refetch();
            self.inner.state.send_if_modified(|state| {
                if state.status == QueryStatus::Loading {
                    state.status = QueryStatus::Idle;
                    true
                } else {
                    false
                }
            });
        }
        self.state()
    }

    /// Point the consumer at another key and load it.
    pub async fn set_key(&mut self, key: impl Into<String>) -> QueryState<T> {
        let key = key.into();
        if key == self.key() {
            return self.state();
        }
        debug!(from = %self.key(), to = %key, "Query key changed");
        *self.inner.key.write().unwrap_or_else(|e| e.into_inner()) = key;
        self.inner.bump_generation();
        self.reactivate().await
    }

    /// Swap the producer and load again.
    pub async fn set_fetcher(&mut self, fetcher: Fetcher<T>) -> QueryState<T> {
        if self.inner.fetcher().same_as(&fetcher) {
            return self.state();
        }
        *self.inner.fetcher.write().unwrap_or_else(|e| e.into_inner()) = fetcher;
        self.inner.bump_generation();
        self.reactivate().await
    }

    pub fn has_refetch_timer(&self) -> bool {
        self.refetch_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the refetch timer. In-flight fetches are left to finish.
    pub fn teardown(&mut self) {
        self.cancel_refetch();
    }

    async fn reactivate(&mut self) -> QueryState<T> {
        if self.is_enabled() {
            self.activate().await
        } else {
            self.cancel_refetch();
            self.state()
        }
    }

    fn cancel_refetch(&mut self) {
        if let Some(task) = self.refetch_task.take() {
            task.abort();
            debug!(key = %self.key(), "Refetch timer cancelled");
        }
    }

    fn schedule_refetch(&mut self) {
        self.cancel_refetch();
        let Some(period) = self.inner.options.active_refetch_interval() else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        debug!(key = %self.key(), period_ms = period.as_millis() as u64, "Refetch timer started");
        self.refetch_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; activation already loaded.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.fetch().await;
            }
        }));
    }

    /// Refetch period in effect, if any.
    pub fn refetch_interval(&self) -> Option<Duration> {
        self.inner.options.active_refetch_interval()
    }
}

impl<T: QueryData> Drop for Query<T> {
    fn drop(&mut self) {
        self.cancel_refetch();
    }
}

// ============================================================================
// Tests
// ============================================================================
