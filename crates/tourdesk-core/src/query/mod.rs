//! Keyed fetch orchestration on top of the shared `QueryCache`.
//!
//! A `Query` is one consumer of one key. On activation it serves a fresh
//! cache entry if there is one, otherwise it calls its fetcher, stores the
//! payload and publishes loading / error / success state to subscribers.
//! It also owns an optional refetch timer, released on teardown.
//!
//! Every fetch carries a generation number. A result that lands after a
//! newer fetch, cache adoption or `set_query_data` has been issued is
//! dropped, so slow responses never overwrite newer data.

pub mod consumer;
pub mod options;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};

use crate::envelope::Response;

pub use consumer::Query;
pub use options::{ErrorCallback, QueryOptions, SuccessCallback, DEFAULT_CACHE_TTL};
pub use state::{QueryState, QueryStatus};

/// Message used when a failed fetch has nothing better to say.
pub const DEFAULT_QUERY_ERROR: &str = "Failed to load data";

/// Bounds every cached payload type has to meet.
pub trait QueryData: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> QueryData for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Asynchronous producer for a query's payload.
pub struct Fetcher<T> {
    f: Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Response<T>>> + Send + Sync>,
}

impl<T> Clone for Fetcher<T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<T> std::fmt::Debug for Fetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Fetcher")
    }
}

impl<T: 'static> Fetcher<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response<T>>> + Send + 'static,
    {
        Self {
            f: Arc::new(move || f().boxed()),
        }
    }

    pub fn call(&self) -> BoxFuture<'static, anyhow::Result<Response<T>>> {
        (self.f)()
    }

    /// Whether two fetchers are the same producer.
    pub fn same_as(&self, other: &Fetcher<T>) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(value: u32) -> Fetcher<u32> {
        Fetcher::new(move || async move { Ok(Response::Raw(value)) })
    }

    #[test]
    fn test_fetcher_identity_follows_clones() {
        let original = fetcher(1);
        let copy = original.clone();
        let lookalike = fetcher(1);

        assert!(original.same_as(&copy));
        assert!(copy.same_as(&original));
        assert!(!original.same_as(&lookalike));
    }

    #[tokio::test]
    async fn test_fetcher_call_runs_producer() {
        let payload = fetcher(7).call().await.unwrap().into_payload().unwrap();
        assert_eq!(payload, 7);
    }
}
