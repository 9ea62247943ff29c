//! Read-Through Cache Module
//!
//! Serves values from the store, computes them on a miss, and refreshes them
//! in the background when a read decides the entry is close enough to expiry.

use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::clock::{deadline, Clock, DrawSource, SystemClock, ThreadRngDraws};
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::cache::store::{ExpiringStore, MemoryStore};
use crate::cache::{Item, Items, DEFAULT_BETA};
use crate::config::{is_valid_beta, Config};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_task;

/// Callback invoked when a background refresh fails.
pub type RefreshErrorObserver = Arc<dyn Fn(&str, &CacheError) + Send + Sync>;

type InFlightKeys = Arc<Mutex<HashSet<String>>>;

// == Cache ==
/// Read-through cache with probabilistic early recomputation.
///
/// A hit always returns the stored value without waiting. Each hit also
/// draws a random early-refresh decision (see [`Item::should_recompute_early`]);
/// when it fires, the compute future runs on a detached Tokio task and, if it
/// succeeds, replaces the item. Several readers may refresh the same key at
/// once; the last write wins.
///
/// # Example
/// ```ignore
/// let cache: Cache<String> = Cache::new();
/// let value = cache
///     .get("user:1", Duration::from_secs(60), || async {
///         Ok::<_, anyhow::Error>(load_user(1).await?)
///     })
///     .await?;
/// ```
pub struct Cache<V, S = MemoryStore<Arc<Item<V>>>> {
    /// Backing expiring store
    store: Arc<S>,
    /// Time source for latency and expiry
    clock: Arc<dyn Clock>,
    /// Uniform draws for the early recompute decision
    draws: Arc<dyn DrawSource>,
    /// Early recomputation aggressiveness
    beta: f64,
    /// Read and refresh counters
    stats: Arc<StatsRecorder>,
    /// Keys with a refresh running, when de-duplication is enabled
    in_flight: Option<InFlightKeys>,
    /// Optional hook for failed background refreshes
    on_refresh_error: Option<RefreshErrorObserver>,
    /// Sweep task owned by this cache, aborted on drop
    sweeper: Option<JoinHandle<()>>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a memory-backed cache with the default configuration.
    ///
    /// The store sweep only starts when called inside a Tokio runtime.
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    /// Creates a memory-backed cache from configuration.
    pub fn from_config(config: &Config) -> Self {
        let store: Arc<MemoryStore<Arc<Item<V>>>> = Arc::new(MemoryStore::new());
        let sweeper = spawn_sweep_task(&store, config.sweep_interval());

        let mut builder = Cache::builder(store)
            .beta(config.beta)
            .dedupe_refreshes(config.dedupe_refreshes);
        if let Some(handle) = sweeper {
            builder = builder.sweeper(handle);
        }
        builder.build()
    }
}

impl<V> Default for Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> Cache<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: ExpiringStore<Arc<Item<V>>>,
{
    /// Starts building a cache over `store`.
    pub fn builder(store: Arc<S>) -> CacheBuilder<V, S> {
        CacheBuilder::new(store)
    }

    // == Get ==
    /// Returns the value for `key`, computing it on a miss.
    ///
    /// On a miss `compute` is awaited inline and its result stored for `ttl`;
    /// a failure is returned and nothing is cached. On a hit the stored value
    /// is returned immediately and `compute` only runs if the early recompute
    /// decision fires, in which case it runs in the background on the current
    /// Tokio runtime. Without a runtime the early refresh is skipped.
    pub async fn get<F, Fut, E>(&self, key: &str, ttl: Duration, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        if let Some(item) = self.store.get(key).await {
            self.stats.record_hit();
            let now = self.clock.now();
            if item.should_recompute_early(now, self.beta, self.draws.draw()) {
                self.spawn_refresh(key, ttl, compute());
            }
            return Ok(item.value.clone());
        }

        self.stats.record_miss();
        let started = self.clock.now();
        let value = match compute().await {
            Ok(value) => value,
            Err(err) => {
                self.stats.record_compute_error();
                return Err(CacheError::compute(key, err));
            }
        };
        let finished = self.clock.now();

        let item = Item::new(
            key,
            value.clone(),
            finished.saturating_duration_since(started),
            deadline(finished, ttl),
        );
        self.store.put(key, Arc::new(item), ttl).await;
        Ok(value)
    }

    // == Set ==
    /// Writes `item` verbatim under its own key for `ttl`.
    pub async fn set(&self, item: Item<V>, ttl: Duration) {
        let key = item.key.clone();
        self.store.put(&key, Arc::new(item), ttl).await;
    }

    // == Batch Get ==
    /// Looks up each key. Missing or expired keys are left out of the result.
    pub async fn batch_get<K: AsRef<str>>(&self, keys: &[K]) -> Items<V> {
        let mut items = Items::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.store.get(key.as_ref()).await {
                items.push(item);
            }
        }
        items
    }

    // == Batch Set ==
    /// Writes every item verbatim under its own key, all with the same `ttl`.
    pub async fn batch_set<I>(&self, items: I, ttl: Duration)
    where
        I: IntoIterator<Item = Arc<Item<V>>>,
    {
        for item in items {
            let key = item.key.clone();
            self.store.put(&key, item, ttl).await;
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configured beta.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    fn spawn_refresh<Fut, E>(&self, key: &str, ttl: Duration, refresh: Fut)
    where
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            debug!(key, "No Tokio runtime available, skipping early refresh");
            return;
        };

        let claim = match &self.in_flight {
            Some(keys) => match InFlightClaim::acquire(keys, key) {
                Some(claim) => Some(claim),
                None => {
                    self.stats.record_refresh_deduplicated();
                    debug!(key, "Refresh already in flight, skipping");
                    return;
                }
            },
            None => None,
        };

        let key = key.to_string();
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let stats = Arc::clone(&self.stats);
        let observer = self.on_refresh_error.clone();

        stats.record_refresh_started();
        debug!(key = %key, "Spawning early refresh");

        runtime.spawn(async move {
            let _claim = claim;
            let started = clock.now();
            let outcome = refresh.await;
            let finished = clock.now();

            match outcome {
                Ok(value) => {
                    let latency = finished.saturating_duration_since(started);
                    let item = Item::new(key.clone(), value, latency, deadline(finished, ttl));
                    store.put(&key, Arc::new(item), ttl).await;
                    stats.record_refresh_completed();
                    debug!(key = %key, latency = ?latency, "Early refresh stored");
                }
                Err(err) => {
                    let err = CacheError::compute(key, err);
                    stats.record_refresh_failed();
                    debug!(error = %err, "Early refresh failed, keeping existing item");
                    if let Some(observer) = observer {
                        observer(err.key(), &err);
                    }
                }
            }
        });
    }
}

impl<V, S> Drop for Cache<V, S> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl<V, S> std::fmt::Debug for Cache<V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("beta", &self.beta)
            .field("dedupe_refreshes", &self.in_flight.is_some())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

// == In-Flight Claim ==
/// Marks a key as refreshing until dropped.
struct InFlightClaim {
    keys: InFlightKeys,
    key: String,
}

impl InFlightClaim {
    fn acquire(keys: &InFlightKeys, key: &str) -> Option<Self> {
        let inserted = keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());

        inserted.then(|| Self {
            keys: Arc::clone(keys),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

// == Cache Builder ==
/// Builder for [`Cache`].
pub struct CacheBuilder<V, S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    draws: Arc<dyn DrawSource>,
    beta: f64,
    dedupe_refreshes: bool,
    on_refresh_error: Option<RefreshErrorObserver>,
    sweeper: Option<JoinHandle<()>>,
    _value: PhantomData<fn() -> V>,
}

impl<V, S> CacheBuilder<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: ExpiringStore<Arc<Item<V>>>,
{
    /// Creates a builder with the system clock, thread RNG draws and beta 1.0.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            draws: Arc::new(ThreadRngDraws),
            beta: DEFAULT_BETA,
            dedupe_refreshes: false,
            on_refresh_error: None,
            sweeper: None,
            _value: PhantomData,
        }
    }

    /// Sets the clock used to measure latency and compute expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the source of early recompute draws.
    pub fn draws(mut self, draws: Arc<dyn DrawSource>) -> Self {
        self.draws = draws;
        self
    }

    /// Sets beta. Values above 1.0 refresh earlier, 0 only at expiry.
    ///
    /// Negative or non-finite values are ignored.
    pub fn beta(mut self, beta: f64) -> Self {
        if is_valid_beta(beta) {
            self.beta = beta;
        } else {
            warn!(beta, "Ignoring invalid beta, keeping {}", self.beta);
        }
        self
    }

    /// Skips a refresh when one for the same key is already running.
    ///
    /// Off by default: concurrent refreshes of one key are otherwise allowed.
    pub fn dedupe_refreshes(mut self, enabled: bool) -> Self {
        self.dedupe_refreshes = enabled;
        self
    }

    /// Registers a callback for background refresh failures.
    pub fn on_refresh_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, &CacheError) + Send + Sync + 'static,
    {
        self.on_refresh_error = Some(Arc::new(observer));
        self
    }

    /// Hands a sweep task to the cache so it is aborted when the cache drops.
    pub fn sweeper(mut self, handle: JoinHandle<()>) -> Self {
        self.sweeper = Some(handle);
        self
    }

    /// Builds the cache.
    pub fn build(self) -> Cache<V, S> {
        Cache {
            store: self.store,
            clock: self.clock,
            draws: self.draws,
            beta: self.beta,
            stats: Arc::new(StatsRecorder::default()),
            in_flight: self
                .dedupe_refreshes
                .then(|| Arc::new(Mutex::new(HashSet::new()))),
            on_refresh_error: self.on_refresh_error,
            sweeper: self.sweeper,
            _value: PhantomData,
        }
    }
}
