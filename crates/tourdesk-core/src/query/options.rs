use std::sync::Arc;
use std::time::Duration;

use crate::envelope::ErrorInfo;

/// Cache TTL used when a consumer does not pick one (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ErrorInfo) + Send + Sync>;

pub struct QueryOptions<T> {
    pub enabled: bool,
    /// Forced refetch period. `None` or zero disables polling.
    pub refetch_interval: Option<Duration>,
    pub on_success: Option<SuccessCallback<T>>,
    pub on_error: Option<ErrorCallback>,
    pub initial_data: Option<T>,
    /// How long a cache entry counts as fresh for this consumer.
    pub cache_ttl: Duration,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_interval: None,
            on_success: None,
            on_error: None,
            initial_data: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl<T: Clone> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            refetch_interval: self.refetch_interval,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            initial_data: self.initial_data.clone(),
            cache_ttl: self.cache_ttl,
        }
    }
}

impl<T> std::fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("enabled", &self.enabled)
            .field("refetch_interval", &self.refetch_interval)
            .field("has_on_success", &self.on_success.is_some())
            .field("has_on_error", &self.on_error.is_some())
            .field("has_initial_data", &self.initial_data.is_some())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl<T> QueryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    pub fn on_success(mut self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ErrorInfo) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn initial_data(mut self, data: T) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The polling period, if polling is on.
    pub(crate) fn active_refetch_interval(&self) -> Option<Duration> {
        self.refetch_interval.filter(|interval| !interval.is_zero())
    }
}
