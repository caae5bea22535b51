//! Core library for tourdesk.
//!
//! Client-side data layer for the tour-operator back office:
//!
//! - `cache`: shared, TTL-checked store of fetched payloads
//! - `query`: keyed fetch orchestration with refetch timers
//! - `mutation`: tracked writes with callbacks
//! - `pagination`, `infinite`: paged and endlessly scrolled listings
//! - `debounce`: debounce, throttle and debounced search helpers
//! - `storage`: small JSON-file backed preferences
//! - `api`: HTTP client, notifications and endpoint-bound mutations
//! - `models`: tours, users and reservation states

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod envelope;
pub mod error;
pub mod infinite;
pub mod models;
pub mod mutation;
pub mod pagination;
pub mod query;
pub mod storage;

pub use cache::{CacheEntry, QueryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use envelope::{Envelope, ErrorInfo, Response};
pub use error::QueryError;
pub use infinite::{InfiniteList, InfiniteOptions};
pub use mutation::{Mutation, MutationOptions, MutationState};
pub use pagination::{Page, Paginated, PaginationOptions};
pub use query::{Fetcher, Query, QueryOptions, QueryState, QueryStatus};
