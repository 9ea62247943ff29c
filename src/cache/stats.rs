//! Cache Statistics Module
//!
//! Tracks read outcomes and background refresh activity.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that found a value in the store
    pub hits: u64,
    /// Reads that had to compute synchronously
    pub misses: u64,
    /// Synchronous computations that failed
    pub compute_errors: u64,
    /// Background refreshes spawned
    pub refreshes_started: u64,
    /// Background refreshes that wrote a new item
    pub refreshes_completed: u64,
    /// Background refreshes whose compute failed
    pub refreshes_failed: u64,
    /// Refresh decisions skipped because one was already in flight
    pub refreshes_deduplicated: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Background refreshes that have not finished yet.
    pub fn refreshes_in_flight(&self) -> u64 {
        self.refreshes_started
            .saturating_sub(self.refreshes_completed + self.refreshes_failed)
    }
}

// == Stats Recorder ==
/// Lock-free counters shared between the cache and its refresh tasks.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    compute_errors: AtomicU64,
    refreshes_started: AtomicU64,
    refreshes_completed: AtomicU64,
    refreshes_failed: AtomicU64,
    refreshes_deduplicated: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compute_error(&self) {
        self.compute_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_completed(&self) {
        self.refreshes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_failed(&self) {
        self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh_deduplicated(&self) {
        self.refreshes_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compute_errors: self.compute_errors.load(Ordering::Relaxed),
            refreshes_started: self.refreshes_started.load(Ordering::Relaxed),
            refreshes_completed: self.refreshes_completed.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
            refreshes_deduplicated: self.refreshes_deduplicated.load(Ordering::Relaxed),
        }
    }
}
