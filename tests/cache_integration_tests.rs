//! Integration Tests for the read-through cache
//!
//! Exercises the public API end to end: miss and hit paths, background
//! refreshes, batch operations and TTL expiry.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use per_cache::cache::{Clock, FixedDraw, ManualClock};
use per_cache::{Cache, CacheError, Item, Items, MemoryStore};
use tokio::sync::Semaphore;

const TTL: Duration = Duration::from_secs(60);

// == Helper Functions ==

fn create_test_cache(draw: f64) -> (Arc<ManualClock>, Cache<String>) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let cache = Cache::builder(store)
        .clock(clock.clone())
        .draws(Arc::new(FixedDraw(draw)))
        .build();
    (clock, cache)
}

type ComputeFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'static>>;

/// Returns a compute function that counts its calls and yields `value`.
fn counting(calls: &Arc<AtomicUsize>, value: &str) -> impl FnOnce() -> ComputeFuture {
    let calls = Arc::clone(calls);
    let value = value.to_string();
    move || -> ComputeFuture {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// == Miss and Hit ==

#[tokio::test]
async fn test_miss_then_hit() {
    let (_, cache) = create_test_cache(1.0);
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let value = cache.get("k", TTL, counting(&first, "v1")).await.unwrap();
    assert_eq!(value, "v1");
    assert_eq!(first.load(Ordering::SeqCst), 1);

    let value = cache.get("k", TTL, counting(&second, "v2")).await.unwrap();
    assert_eq!(value, "v1");
    assert_eq!(second.load(Ordering::SeqCst), 0);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_error_on_first_miss_is_not_cached() {
    let (_, cache) = create_test_cache(1.0);

    let err = cache
        .get("k", TTL, || async {
            Err::<String, _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Compute { .. }));
    assert_eq!(err.key(), "k");

    let calls = Arc::new(AtomicUsize::new(0));
    let value = cache.get("k", TTL, counting(&calls, "ok")).await.unwrap();
    assert_eq!(value, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().misses, 2);
}

#[tokio::test]
async fn test_expired_entry_takes_miss_path() {
    let (clock, cache) = create_test_cache(1.0);
    cache
        .get("k", Duration::from_secs(1), || async {
            Ok::<_, anyhow::Error>("v1".to_string())
        })
        .await
        .unwrap();

    clock.advance(Duration::from_secs(1));

    let calls = Arc::new(AtomicUsize::new(0));
    let value = cache.get("k", TTL, counting(&calls, "v2")).await.unwrap();
    assert_eq!(value, "v2");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_refresh_then_expiry_surfaces_error() {
    let (clock, cache) = create_test_cache(1.0);
    let store_ttl = Duration::from_secs(10);
    cache
        .set(Item::new("k", "old".to_string(), Duration::ZERO, clock.now()), store_ttl)
        .await;

    let value = cache
        .get("k", TTL, || async { Err::<String, _>(anyhow::anyhow!("refresh failed")) })
        .await
        .unwrap();
    assert_eq!(value, "old");
    wait_until(|| cache.stats().refreshes_failed == 1).await;

    // The failed refresh left the old item in place until the store drops it.
    clock.advance(store_ttl);

    let err = cache
        .get("k", TTL, || async { Err::<String, _>(anyhow::anyhow!("still failing")) })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Compute { .. }));
    assert_eq!(err.key(), "k");

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.compute_errors, 1);
    assert!(cache.batch_get(&["k"]).await.is_empty());
}

#[tokio::test]
async fn test_fresh_hit_does_not_wait_for_compute() {
    let (_, cache) = create_test_cache(1.0);
    cache
        .get("k", TTL, || async { Ok::<_, anyhow::Error>("v1".to_string()) })
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let started = Instant::now();
    let value = cache
        .get("k", TTL, move || async move {
            seen.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>("slow".to_string())
        })
        .await
        .unwrap();

    assert_eq!(value, "v1");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_triggered_hit_does_not_wait_for_compute() {
    let (clock, cache) = create_test_cache(1.0);
    cache
        .set(Item::new("k", "old".to_string(), Duration::ZERO, clock.now()), TTL)
        .await;

    let started = Instant::now();
    let value = cache
        .get("k", TTL, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, anyhow::Error>("slow".to_string())
        })
        .await
        .unwrap();

    assert_eq!(value, "old");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(cache.stats().refreshes_started, 1);
}

// == Early Recomputation ==

#[tokio::test]
async fn test_refresh_triggers_at_latency_scaled_margin() {
    // -ln(0.5) * 10s ~= 6.93s ahead of expiry
    let (clock, cache) = create_test_cache(0.5);
    let expiry = clock.now() + Duration::from_secs(30);
    cache
        .set(Item::new("k", "v".to_string(), Duration::from_secs(10), expiry), TTL)
        .await;
    let calls = Arc::new(AtomicUsize::new(0));

    clock.advance(Duration::from_secs(22));
    cache.get("k", TTL, counting(&calls, "v")).await.unwrap();
    assert_eq!(cache.stats().refreshes_started, 0);

    clock.advance(Duration::from_secs(2));
    cache.get("k", TTL, counting(&calls, "v")).await.unwrap();
    assert_eq!(cache.stats().refreshes_started, 1);

    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn test_zero_beta_waits_for_expiry() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let cache: Cache<String> = Cache::builder(store)
        .clock(clock.clone())
        .draws(Arc::new(FixedDraw(1e-9)))
        .beta(0.0)
        .build();
    let expiry = clock.now() + Duration::from_secs(10);
    cache
        .set(Item::new("k", "v".to_string(), Duration::from_secs(3600), expiry), TTL)
        .await;
    let calls = Arc::new(AtomicUsize::new(0));

    clock.advance(Duration::from_millis(9_999));
    cache.get("k", TTL, counting(&calls, "v")).await.unwrap();
    assert_eq!(cache.stats().refreshes_started, 0);

    clock.advance(Duration::from_millis(1));
    cache.get("k", TTL, counting(&calls, "v")).await.unwrap();
    assert_eq!(cache.stats().refreshes_started, 1);
}

#[tokio::test]
async fn test_concurrent_reads_see_old_item_until_refresh_lands() {
    let (clock, cache) = create_test_cache(1.0);
    let cache = Arc::new(cache);
    cache
        .set(Item::new("k", "old".to_string(), Duration::ZERO, clock.now()), TTL)
        .await;
    let original = cache.batch_get(&["k"]).await;

    let gate = Arc::new(Semaphore::new(0));
    let trigger_gate = gate.clone();
    let value = cache
        .get("k", TTL, move || async move {
            let _permit = trigger_gate.acquire().await;
            Ok::<_, anyhow::Error>("new".to_string())
        })
        .await
        .unwrap();
    assert_eq!(value, "old");

    let mut readers = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let gate = gate.clone();
        readers.push(tokio::spawn(async move {
            let seen = cache.batch_get(&["k"]).await;
            let value = cache
                .get("k", TTL, move || async move {
                    let _permit = gate.acquire().await;
                    Ok::<_, anyhow::Error>("new".to_string())
                })
                .await
                .unwrap();
            (seen, value)
        }));
    }
    for reader in readers {
        let (seen, value) = reader.await.unwrap();
        assert_eq!(value, "old");
        assert!(Arc::ptr_eq(&seen[0], &original[0]));
    }

    gate.add_permits(64);
    wait_until(|| {
        let stats = cache.stats();
        stats.refreshes_completed == stats.refreshes_started
    })
    .await;

    let refreshed = cache.batch_get(&["k"]).await;
    assert_eq!(refreshed.values(), vec!["new".to_string()]);
    assert_eq!(refreshed[0].expiry, clock.now() + TTL);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_cache_across_threads() {
    let cache: Arc<Cache<u64>> = Arc::new(Cache::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            let mut values = Vec::new();
            for _ in 0..50 {
                let calls = Arc::clone(&calls);
                let value = cache
                    .get("k", TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(42)
                    })
                    .await
                    .unwrap();
                values.push(value);
            }
            values
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().iter().all(|v| *v == 42));
    }
    // Duplicate first computations are allowed, but every read is served.
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 400);
    assert!(calls.load(Ordering::SeqCst) >= 1);
}

// == Batch Operations ==

#[tokio::test]
async fn test_batch_get_partial_result() {
    let (clock, cache) = create_test_cache(1.0);
    let expiry = clock.now() + TTL;
    cache
        .batch_set(
            Items::from(vec![
                Item::new("a", "A".to_string(), Duration::ZERO, expiry),
                Item::new("c", "C".to_string(), Duration::ZERO, expiry),
            ]),
            TTL,
        )
        .await;

    let items = cache.batch_get(&["a", "b", "c"]).await;

    let mut keys = items.keys();
    keys.sort_unstable();
    assert_eq!(keys, vec!["a", "c"]);
    assert_eq!(cache.stats().misses, 0);
}

#[tokio::test]
async fn test_batch_set_round_trips_items_verbatim() {
    let (clock, source) = create_test_cache(1.0);
    let (_, target) = create_test_cache(1.0);
    source
        .get("k", TTL, || async { Ok::<_, anyhow::Error>("v".to_string()) })
        .await
        .unwrap();

    let items = source.batch_get(&["k"]).await;
    target.batch_set(items.clone(), TTL).await;

    let copied = target.batch_get(&["k"]).await;
    assert!(Arc::ptr_eq(&items[0], &copied[0]));
    assert_eq!(copied[0].expiry, clock.now() + TTL);
}

#[tokio::test]
async fn test_batch_set_zero_ttl_is_not_stored() {
    let (clock, cache) = create_test_cache(1.0);
    cache
        .set(Item::new("k", "v".to_string(), Duration::ZERO, clock.now() + TTL), TTL)
        .await;

    let items = cache.batch_get(&["k"]).await;
    cache.batch_set(items, Duration::ZERO).await;

    assert!(cache.batch_get(&["k"]).await.is_empty());
}
