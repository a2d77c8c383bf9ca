//! Cache module
//!
//! Two caches with nothing in common but their purpose: `MemoryCache` keeps
//! values in process memory with per-item expiry, and `Store` persists byte
//! keys and values in named buckets inside a single database file.

mod memory;
mod store;

pub use memory::{CacheError, Expiration, MemoryCache};
pub use store::{Bucket, Store, StoreError, Tx};
