use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: Value, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    /// Age of the entry as seen from `now`. Clock skew reads as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = (self.age(now).as_secs() / 60) as i64;
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &str) -> Result<T, QueryError> {
        serde_json::from_value(self.value.clone()).map_err(|source| QueryError::Decode {
            key: key.to_string(),
            source,
        })
    }
}

struct CacheInner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

/// Shared handle to the key/value store.
/// Clone is cheap - every clone points at the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                clock,
            }),
        }
    }

    /// Current time according to the injected clock
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.read_entries().get(key).cloned()
    }

    /// Overwrite the entry for `key`, stamping it with the current time.
    pub fn set(&self, key: &str, value: Value) {
        let entry = CacheEntry::new(value, self.now());
        self.write_entries().insert(key.to_string(), entry);
        debug!(key = key, "Cache entry stored");
    }

    pub fn delete(&self, key: &str) {
        if self.write_entries().remove(key).is_some() {
            debug!(key = key, "Cache entry deleted");
        }
    }

    /// Serialize and store a typed value.
    pub fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<(), QueryError> {
        let json = serde_json::to_value(value).map_err(|source| QueryError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set(key, json);
        Ok(())
    }

    /// Entry for `key` only if it is younger than `ttl`.
    pub fn get_fresh(&self, key: &str, ttl: Duration) -> Option<CacheEntry> {
        let now = self.now();
        self.get(key).filter(|entry| entry.is_fresh(now, ttl))
    }

    /// Typed fresh read. An entry that no longer decodes as `T` counts as a miss.
    pub fn get_fresh_as<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let entry = self.get_fresh(key, ttl)?;
        match entry.decode(key) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = key, error = %e, "Cached value did not decode, treating as miss");
                None
            }
        }
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many went.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.write_entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        debug!(prefix = prefix, removed = removed, "Cache prefix invalidated");
        removed
    }

    pub fn clear(&self) {
        self.write_entries().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read_entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.inner.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.inner.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
