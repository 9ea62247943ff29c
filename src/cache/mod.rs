//! Cache Module
//!
//! Provides a read-through cache with probabilistic early recomputation on
//! top of an expiring key-value store.

mod clock;
mod item;
mod read_through;
mod stats;
mod store;


use std::time::Duration;

// Re-export public types
pub use clock::{
    deadline, sample_open_closed, Clock, DrawSource, FixedDraw, ManualClock, SystemClock,
    ThreadRngDraws,
};
pub use item::{Item, Items};
pub use read_through::{Cache, CacheBuilder, RefreshErrorObserver};
pub use stats::CacheStats;
pub use store::{ExpiringStore, MemoryStore};

// == Public Constants ==
/// Default early recomputation aggressiveness
pub const DEFAULT_BETA: f64 = 1.0;

/// Default interval between store sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
