//! Timer-driven helpers: debouncing, throttling and debounced search.
//!
//! Every helper owns its scheduled task through a `JoinHandle` and aborts it
//! when replaced or dropped, so nothing fires after its owner is gone.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::envelope::ErrorInfo;
use crate::query::ErrorCallback;

/// Default quiet period / rate limit (500 ms).
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Queries shorter than this are not sent to the search function.
pub const DEFAULT_MIN_SEARCH_LENGTH: usize = 2;

const DEFAULT_SEARCH_ERROR: &str = "Search failed";

fn replace_task(slot: &Mutex<Option<JoinHandle<()>>>, task: Option<JoinHandle<()>>) {
    let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(previous) = slot.take() {
        previous.abort();
    }
    *slot = task;
}

fn slot_is_pending(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    slot.lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .is_some_and(|task| !task.is_finished())
}

// ============================================================================
// Debouncer
// ============================================================================

/// Runs a callback once calls have stopped for `delay`.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `f`, cancelling whatever was scheduled before.
    pub fn call(&self, f: impl FnOnce() + Send + 'static) {
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        replace_task(&self.pending, Some(task));
    }

    pub fn cancel(&self) {
        replace_task(&self.pending, None);
    }

    pub fn is_pending(&self) -> bool {
        slot_is_pending(&self.pending)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// Throttler
// ============================================================================

/// Runs a callback at most once per `limit`. A call inside the window is
/// deferred to the end of it, replacing any call already deferred.
pub struct Throttler {
    limit: Duration,
    last_ran: Arc<Mutex<Option<Instant>>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl Throttler {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            last_ran: Arc::new(Mutex::new(None)),
            pending: Mutex::new(None),
        }
    }

    /// Returns true when `f` ran right away.
    pub fn call(&self, f: impl FnOnce() + Send + 'static) -> bool {
        replace_task(&self.pending, None);

        let now = Instant::now();
        let remaining = {
            let last_ran = self.last_ran.lock().unwrap_or_else(|e| e.into_inner());
            match *last_ran {
                Some(at) => self.limit.saturating_sub(now.duration_since(at)),
                None => Duration::ZERO,
            }
        };

        if remaining.is_zero() {
            *self.last_ran.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
            f();
            return true;
        }

        let last_ran = Arc::clone(&self.last_ran);
        let task = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            *last_ran.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
            f();
        });
        replace_task(&self.pending, Some(task));
        false
    }

    pub fn cancel(&self) {
        replace_task(&self.pending, None);
    }

    pub fn is_pending(&self) -> bool {
        slot_is_pending(&self.pending)
    }
}

impl Drop for Throttler {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// DebouncedValue
// ============================================================================

/// A value whose readers only see it once it has held still for `delay`.
pub struct DebouncedValue<T> {
    input: watch::Sender<T>,
    output: watch::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> DebouncedValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T, delay: Duration) -> Self {
        let (input, input_rx) = watch::channel(initial.clone());
        let (output_tx, output) = watch::channel(initial);
        let task = tokio::spawn(debounce_loop(input_rx, output_tx, delay));
        Self {
            input,
            output,
            task,
        }
    }

    pub fn set(&self, value: T) {
        self.input.send_replace(value);
    }

    /// The latest value written, settled or not.
    pub fn latest(&self) -> T {
        self.input.borrow().clone()
    }

    /// The settled value.
    pub fn get(&self) -> T {
        self.output.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.output.clone()
    }
}

impl<T> Drop for DebouncedValue<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop<T: Clone>(
    mut input: watch::Receiver<T>,
    output: watch::Sender<T>,
    delay: Duration,
) {
    while input.changed().await.is_ok() {
        loop {
            tokio::select! {
                changed = input.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep(delay) => break,
            }
        }
        let value = input.borrow_and_update().clone();
        output.send_replace(value);
    }
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SearchState<T> {
    /// The settled query the results belong to.
    pub query: String,
    pub results: Vec<T>,
    pub is_loading: bool,
    pub error: Option<ErrorInfo>,
}

impl<T> Default for SearchState<T> {
    fn default() -> Self {
        Self {
            query: String::new(),
            results: Vec::new(),
            is_loading: false,
            error: None,
        }
    }
}

pub type ResultsCallback<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

pub struct SearchOptions<T> {
    pub delay: Duration,
    pub min_length: usize,
    /// Called with the results of every successful search.
    pub on_success: Option<ResultsCallback<T>>,
    pub on_error: Option<ErrorCallback>,
}

impl<T> Default for SearchOptions<T> {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            min_length: DEFAULT_MIN_SEARCH_LENGTH,
            on_success: None,
            on_error: None,
        }
    }
}

impl<T> Clone for SearchOptions<T> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            min_length: self.min_length,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SearchOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOptions")
            .field("delay", &self.delay)
            .field("min_length", &self.min_length)
            .field("has_on_success", &self.on_success.is_some())
            .field("has_on_error", &self.on_error.is_some())
            .finish()
    }
}

impl<T> SearchOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn on_success(mut self, f: impl Fn(&[T]) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ErrorInfo) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

type SearchFn<T> = Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Vec<T>>> + Send + Sync>;

/// Search box: a debounced query string driving a search function.
pub struct Search<T> {
    query: DebouncedValue<String>,
    state: watch::Receiver<SearchState<T>>,
    task: JoinHandle<()>,
}

impl<T> Search<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(search_fn: F, options: SearchOptions<T>) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        let search_fn: SearchFn<T> = Arc::new(move |query| search_fn(query).boxed());
        let query = DebouncedValue::new(String::new(), options.delay);
        let (state_tx, state) = watch::channel(SearchState::default());
        let task = tokio::spawn(search_loop(query.subscribe(), state_tx, search_fn, options));

        Self { query, state, task }
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.query.set(query.into());
    }

    /// What the user typed last, settled or not.
    pub fn query(&self) -> String {
        self.query.latest()
    }

    pub fn state(&self) -> SearchState<T> {
        self.state.borrow().clone()
    }

    pub fn results(&self) -> Vec<T> {
        self.state.borrow().results.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState<T>> {
        self.state.clone()
    }
}

impl<T> Drop for Search<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn search_loop<T: Clone>(
    mut queries: watch::Receiver<String>,
    state: watch::Sender<SearchState<T>>,
    search_fn: SearchFn<T>,
    options: SearchOptions<T>,
) {
    let min_length = options.min_length;
    while queries.changed().await.is_ok() {
        let query = queries.borrow_and_update().clone();

        if query.chars().count() < min_length {
            state.send_modify(|s| {
                s.query = query;
                s.results.clear();
                s.is_loading = false;
                s.error = None;
            });
            continue;
        }

        state.send_modify(|s| {
            s.query = query.clone();
            s.is_loading = true;
            s.error = None;
        });
        debug!(query = %query, "Searching");

        match search_fn(query.clone()).await {
            Ok(results) => {
                if let Some(on_success) = &options.on_success {
                    on_success(&results);
                }
                state.send_modify(|s| {
                    s.results = results;
                    s.is_loading = false;
                });
            }
            Err(e) => {
                let info = ErrorInfo::from_rejection(&e, DEFAULT_SEARCH_ERROR);
                warn!(query = %query, error = %info, "Search failed");
                if let Some(on_error) = &options.on_error {
                    on_error(&info);
                }
                state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(info);
                });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_runs_last_call_once() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let fired = Arc::new(Mutex::new(Vec::new()));

        for value in 1..=3 {
            let fired = Arc::clone(&fired);
            debouncer.call(move || fired.lock().unwrap().push(value));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(fired.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*fired.lock().unwrap(), vec![3]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttler_defers_calls_inside_window() {
        let throttler = Throttler::new(Duration::from_millis(500));
        let fired = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&fired);
        assert!(throttler.call(move || sink.lock().unwrap().push("first")));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let sink = Arc::clone(&fired);
        assert!(!throttler.call(move || sink.lock().unwrap().push("second")));
        let sink = Arc::clone(&fired);
        assert!(!throttler.call(move || sink.lock().unwrap().push("third")));
        assert_eq!(*fired.lock().unwrap(), vec!["first"]);

        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(*fired.lock().unwrap(), vec!["first", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_value_settles() {
        let value = DebouncedValue::new(String::new(), Duration::from_millis(500));
        value.set("t".to_string());
        value.set("to".to_string());
        value.set("tour".to_string());
        assert_eq!(value.get(), "");
        assert_eq!(value.latest(), "tour");

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(value.get(), "tour");
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_respects_min_length() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let search = Search::new(
            move |query: String| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(vec![format!("{} result", query)]) }
            },
            SearchOptions::default(),
        );

        search.set_query("t");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(search.results().is_empty());

        search.set_query("tour");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.results(), vec!["tour result".to_string()]);
        assert!(!search.is_loading());
        assert_eq!(search.state().query, "tour");
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_error_is_reported() {
        let search: Search<String> = Search::new(
            |_query: String| async { Err(anyhow::anyhow!("Servicio no disponible")) },
            SearchOptions::default(),
        );
        search.set_query("lima");
        tokio::time::sleep(Duration::from_millis(600)).await;

        let state = search.state();
        assert!(!state.is_loading);
        assert_eq!(state.error, Some(ErrorInfo::message("Servicio no disponible")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_callbacks_see_outcomes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (ok_log, err_log) = (Arc::clone(&log), Arc::clone(&log));
        let options = SearchOptions::new()
            .delay(Duration::from_millis(200))
            .min_length(3)
            .on_success(move |results: &[String]| ok_log.lock().unwrap().push(format!("ok {}", results.len())))
            .on_error(move |e: &ErrorInfo| err_log.lock().unwrap().push(format!("error {}", e)));
        let search = Search::new(
            |query: String| async move {
                if query == "cusco" {
                    Ok(vec!["Cusco".to_string(), "Cusco Sur".to_string()])
                } else {
                    Err(anyhow::anyhow!("Sin resultados"))
                }
            },
            options,
        );

        search.set_query("cu");
        tokio::time::sleep(Duration::from_millis(300)).await;
        search.set_query("cusco");
        tokio::time::sleep(Duration::from_millis(300)).await;
        search.set_query("puno");
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["ok 2".to_string(), "error Sin resultados".to_string()]
        );
    }
}
