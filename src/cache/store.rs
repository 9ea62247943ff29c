//! Cache Store Module
//!
//! The expiring key-value store the cache reads through, and an in-memory
//! implementation of it with lazy expiry and a periodic sweep.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::cache::clock::{deadline, Clock, SystemClock};

// == Expiring Store Contract ==
/// A shared key-value store whose values disappear after their TTL.
///
/// Implementations synchronize internally; the cache calls them through
/// `&self` from many tasks at once. A value is never returned once its TTL
/// has elapsed, whether or not it has been physically purged yet.
pub trait ExpiringStore<T>: Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    /// Stores `value` under `key` for at most `ttl`.
    ///
    /// A zero `ttl` makes the key unreachable immediately.
    fn put(&self, key: &str, value: T, ttl: Duration) -> impl Future<Output = ()> + Send;

    /// Returns the most recent unexpired value stored under `key`.
    fn get(&self, key: &str) -> impl Future<Output = Option<T>> + Send;
}

// == Stored Value ==
#[derive(Debug, Clone)]
struct StoredValue<T> {
    value: T,
    expires_at: Instant,
}

impl<T> StoredValue<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// == Memory Store ==
/// In-memory expiring store.
///
/// Expired values are hidden from `get` right away and physically removed by
/// [`MemoryStore::cleanup_expired`], normally driven by the sweep task.
pub struct MemoryStore<T> {
    /// Key-value storage
    entries: RwLock<HashMap<String, StoredValue<T>>>,
    /// Time source for expiry
    clock: Arc<dyn Clock>,
}

impl<T> MemoryStore<T> {
    // == Constructor ==
    /// Creates an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired values from the store.
    ///
    /// Returns the number of values removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired(now));
        before - entries.len()
    }

    // == Length ==
    /// Returns the number of values physically held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    // == Is Empty ==
    /// Returns true if the store holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for MemoryStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl<T> ExpiringStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn put(&self, key: &str, value: T, ttl: Duration) {
        let mut entries = self.entries.write().await;
        if ttl.is_zero() {
            entries.remove(key);
            return;
        }

        let expires_at = deadline(self.clock.now(), ttl);
        entries.insert(key.to_string(), StoredValue { value, expires_at });
    }

    async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.value.clone())
    }
}
