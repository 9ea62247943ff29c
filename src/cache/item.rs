//! Cache Item Module
//!
//! Defines the record stored per key and the probabilistic early
//! recomputation decision.

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::cache::clock::sample_open_closed;
use crate::config::is_valid_beta;

// == Item ==
/// A single cached value with the metadata the early recomputation policy needs.
///
/// Items are never mutated once stored. A refresh builds a new item and
/// replaces the old `Arc` in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<V> {
    /// Cache key
    pub key: String,
    /// The cached payload
    pub value: V,
    /// How long the compute call that produced `value` took
    pub compute_latency: Duration,
    /// Nominal expiry instant
    pub expiry: Instant,
}

impl<V> Item<V> {
    // == Constructor ==
    /// Creates a new item.
    pub fn new(
        key: impl Into<String>,
        value: V,
        compute_latency: Duration,
        expiry: Instant,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            compute_latency,
            expiry,
        }
    }

    /// Returns a reference to the cached payload.
    pub fn value(&self) -> &V {
        &self.value
    }

    // == Is Expired ==
    /// Nominal expiry check: `true` once `now >= expiry`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiry
    }

    /// Time left until nominal expiry, zero once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.expiry.saturating_duration_since(now)
    }

    // == Early Recompute Decision ==
    /// Decides whether a read at `now` should recompute this item early.
    ///
    /// The trigger instant is pulled ahead of `expiry` by
    /// `compute_latency * beta * -ln(draw)`, so expensive items get a wider
    /// window. `draw` must lie in `(0, 1]`; values outside that range are
    /// clamped so `ln(0)` is never taken. With `beta == 0` this is exactly
    /// `now >= expiry`.
    ///
    /// `beta` must be finite and non-negative; the cache builder rejects
    /// anything else.
    pub fn should_recompute_early(&self, now: Instant, beta: f64, draw: f64) -> bool {
        debug_assert!(is_valid_beta(beta), "beta must be finite and >= 0, got {beta}");
        let draw = if draw > 0.0 {
            draw.min(1.0)
        } else {
            f64::MIN_POSITIVE
        };
        let scale = beta * -draw.ln();

        let margin = match Duration::try_from_secs_f64(self.compute_latency.as_secs_f64() * scale)
        {
            Ok(margin) => margin,
            // Overflow: the window spans everything.
            Err(_) if scale > 0.0 => return true,
            Err(_) => Duration::ZERO,
        };

        match now.checked_add(margin) {
            Some(trigger) => trigger >= self.expiry,
            None => true,
        }
    }

    /// Same as [`Item::should_recompute_early`], drawing from `rng`.
    pub fn should_recompute_early_with_rng<R: Rng + ?Sized>(
        &self,
        now: Instant,
        beta: f64,
        rng: &mut R,
    ) -> bool {
        self.should_recompute_early(now, beta, sample_open_closed(rng))
    }
}

// == Items ==
/// A batch of shared items, as returned by `batch_get`.
#[derive(Debug, Clone)]
pub struct Items<V>(Vec<Arc<Item<V>>>);

impl<V> Items<V> {
    /// Creates an empty batch with room for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Appends an item.
    pub fn push(&mut self, item: Arc<Item<V>>) {
        self.0.push(item);
    }

    /// Clones out the payload of every item.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.0.iter().map(|item| item.value.clone()).collect()
    }

    /// Returns the keys of every item.
    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|item| item.key.as_str()).collect()
    }

    /// Consumes the batch.
    pub fn into_inner(self) -> Vec<Arc<Item<V>>> {
        self.0
    }
}

impl<V> Default for Items<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> Deref for Items<V> {
    type Target = [Arc<Item<V>>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<V> From<Vec<Item<V>>> for Items<V> {
    fn from(items: Vec<Item<V>>) -> Self {
        Self(items.into_iter().map(Arc::new).collect())
    }
}

impl<V> From<Vec<Arc<Item<V>>>> for Items<V> {
    fn from(items: Vec<Arc<Item<V>>>) -> Self {
        Self(items)
    }
}

impl<V> FromIterator<Arc<Item<V>>> for Items<V> {
    fn from_iter<I: IntoIterator<Item = Arc<Item<V>>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for Items<V> {
    type Item = Arc<Item<V>>;
    type IntoIter = std::vec::IntoIter<Arc<Item<V>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
