//! In-memory key/value cache with per-item expiry
//!
//! Thin wrapper over `moka::sync::Cache`. Each item records its own deadline
//! and a custom `Expiry` hands the remaining lifetime to moka, so items set
//! with different expirations live side by side in one cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use moka::Expiry;
use thiserror::Error;

/// Lifetimes beyond this are treated as "never expires"
const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Errors returned by conditional cache writes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    /// `add` found a live item under the key
    #[error("Item {0} already exists")]
    AlreadyExists(String),

    /// `replace` found no live item under the key
    #[error("Item {0} doesn't exist")]
    NotFound(String),
}

/// How long an item stays in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Use the cache's default expiration
    Default,
    /// Never expire
    Never,
    /// Expire after the given duration
    After(Duration),
}

#[derive(Debug, Clone)]
struct Item<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Item<V> {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Feeds each item's own deadline to moka
struct ItemExpiry;

impl<V> Expiry<String, Item<V>> for ItemExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        item: &Item<V>,
        created_at: Instant,
    ) -> Option<Duration> {
        item.remaining(created_at)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        item: &Item<V>,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        item.remaining(updated_at)
    }
}

/// A thread-safe cache of string keys to `V` values.
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct MemoryCache<V> {
    inner: Cache<String, Item<V>>,
    default_expiration: Option<Duration>,
    expired: Arc<AtomicUsize>,
}

impl<V: Clone + Send + Sync + 'static> std::fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.inner.entry_count())
            .field("default_expiration", &self.default_expiration)
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> MemoryCache<V> {
    /// Creates an empty cache.
    ///
    /// `default_expiration` is the lifetime of items set with
    /// `Expiration::Default`; `None` keeps them until deleted.
    pub fn new(default_expiration: Option<Duration>) -> Self {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&expired);
        let inner = Cache::builder()
            .expire_after(ItemExpiry)
            .eviction_listener(move |_key, _item, cause| {
                if cause == RemovalCause::Expired {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self {
            inner,
            default_expiration,
            expired,
        }
    }

    fn item(&self, value: V, expiration: Expiration) -> Item<V> {
        let lifetime = match expiration {
            Expiration::Default => self.default_expiration,
            Expiration::Never => None,
            Expiration::After(duration) => Some(duration),
        };
        let expires_at = lifetime
            .filter(|d| *d <= MAX_LIFETIME)
            .and_then(|d| Instant::now().checked_add(d));
        Item { value, expires_at }
    }

    /// Stores `value` under `key`, replacing any existing item
    pub fn set(&self, key: impl Into<String>, value: V, expiration: Expiration) {
        let item = self.item(value, expiration);
        self.inner.insert(key.into(), item);
    }

    /// Stores `value` only if no live item exists under `key`
    pub fn add(
        &self,
        key: impl Into<String>,
        value: V,
        expiration: Expiration,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let item = self.item(value, expiration);
        let entry = self.inner.entry(key.clone()).or_insert_with(|| item);
        if entry.is_fresh() {
            Ok(())
        } else {
            Err(CacheError::AlreadyExists(key))
        }
    }

    /// Stores `value` only if a live item already exists under `key`
    pub fn replace(
        &self,
        key: impl Into<String>,
        value: V,
        expiration: Expiration,
    ) -> Result<(), CacheError> {
        let key = key.into();
        let item = self.item(value, expiration);
        let result = self
            .inner
            .entry(key.clone())
            .and_compute_with(|current| match current {
                Some(_) => Op::Put(item),
                None => Op::Nop,
            });
        match result {
            CompResult::ReplacedWith(_) => Ok(()),
            _ => Err(CacheError::NotFound(key)),
        }
    }

    /// Returns the value under `key` unless it is missing or expired
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|item| item.value)
    }

    /// Returns the value under `key` together with its deadline, if any
    pub fn get_with_expiration(&self, key: &str) -> Option<(V, Option<Instant>)> {
        self.inner
            .get(key)
            .map(|item| (item.value, item.expires_at))
    }

    /// Removes `key`, returning whether a live item was present
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Purges expired items and returns how many were removed
    pub fn delete_expired(&self) -> usize {
        let before = self.expired.load(Ordering::Relaxed);
        self.inner.run_pending_tasks();
        let removed = self.expired.load(Ordering::Relaxed) - before;
        if removed > 0 {
            debug!("purged {} expired cache items", removed);
        }
        removed
    }

    /// Number of live items after pending maintenance has run
    pub fn item_count(&self) -> usize {
        self.inner.run_pending_tasks();
        self.inner.entry_count() as usize
    }

    /// Removes every item
    pub fn flush(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }
}
