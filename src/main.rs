//! Per Cache - stampede simulation
//!
//! Runs many concurrent readers against one slow-to-compute key with a short
//! TTL and reports how often the value was recomputed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use per_cache::config::env_or;
use per_cache::{Cache, Config};

/// Simulation parameters, read from the environment.
///
/// - `READERS` - Concurrent reader tasks (default: 64)
/// - `ROUNDS` - Reads per reader (default: 200)
/// - `COMPUTE_MS` - Simulated compute latency (default: 50)
/// - `READ_INTERVAL_MS` - Pause between reads of one reader (default: 10)
/// - `TTL_MS` - TTL of the simulated key (default: 500)
#[derive(Debug, Clone)]
struct Simulation {
    readers: usize,
    rounds: usize,
    compute: Duration,
    read_interval: Duration,
    ttl: Duration,
}

impl Simulation {
    fn from_env() -> Self {
        Self {
            readers: env_or("READERS", 64),
            rounds: env_or("ROUNDS", 200),
            compute: Duration::from_millis(env_or("COMPUTE_MS", 50)),
            read_interval: Duration::from_millis(env_or("READ_INTERVAL_MS", 10)),
            ttl: Duration::from_millis(env_or("TTL_MS", 500)),
        }
    }
}

/// Main entry point for the stampede simulation.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache with the configured policy and sweep interval
/// 4. Spawn reader tasks and wait for them
/// 5. Log the statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber with env filter
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "per_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Per Cache stampede simulation");

    let config = Config::from_env();
    let sim = Simulation::from_env();
    info!(
        "Configuration loaded: beta={}, sweep_interval={}s, dedupe_refreshes={}",
        config.beta, config.sweep_interval, config.dedupe_refreshes
    );
    info!(
        "Simulation: readers={}, rounds={}, compute={:?}, ttl={:?}",
        sim.readers, sim.rounds, sim.compute, sim.ttl
    );

    let cache: Arc<Cache<u64>> = Arc::new(Cache::from_config(&config));
    let computations = Arc::new(AtomicU64::new(0));

    let mut readers = JoinSet::new();
    for _ in 0..sim.readers {
        let cache = Arc::clone(&cache);
        let computations = Arc::clone(&computations);
        let sim = sim.clone();

        readers.spawn(async move {
            for _ in 0..sim.rounds {
                let computations = Arc::clone(&computations);
                let compute = sim.compute;
                let result = cache
                    .get("hot-key", sim.ttl, move || async move {
                        tokio::time::sleep(compute).await;
                        Ok::<_, anyhow::Error>(computations.fetch_add(1, Ordering::Relaxed) + 1)
                    })
                    .await;

                if let Err(err) = result {
                    warn!("Read failed: {}", err);
                }
                tokio::time::sleep(sim.read_interval).await;
            }
        });
    }

    while let Some(joined) = readers.join_next().await {
        joined?;
    }

    let stats = cache.stats();
    info!(
        "Simulation complete: {} computations for {} reads (hit rate {:.2}%)",
        computations.load(Ordering::Relaxed),
        stats.hits + stats.misses,
        stats.hit_rate() * 100.0
    );
    info!("Stats: {}", serde_json::to_string(&stats)?);

    Ok(())
}
