//! Per Cache - An in-memory read-through cache that avoids stampedes
//!
//! Values are computed on a miss and refreshed in the background before they
//! expire, with a probability that rises as expiry approaches and scales with
//! how long the last computation took.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, CacheStats, ExpiringStore, Item, Items, MemoryStore};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
