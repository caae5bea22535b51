//! In-memory query cache shared by every consumer.
//!
//! The `QueryCache` maps a caller-chosen key to the last value stored for it
//! and the instant it was stored. The store itself never expires anything:
//! staleness is decided by the reader, which passes its own TTL on each read.
//!
//! Values are held as JSON so a single store can back consumers of any
//! serializable type. Typed reads decode on the way out.

pub mod store;

pub use store::{CacheEntry, QueryCache};
