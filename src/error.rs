//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Lookups never fail: a missing or expired key is a normal outcome that
/// triggers a computation. The only failure a caller can observe is the
/// compute function failing on the synchronous miss path.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The compute function failed while producing a value for `key`
    #[error("Compute failed for key '{key}': {source}")]
    Compute {
        /// Key whose value was being computed
        key: String,
        /// Error returned by the compute function
        #[source]
        source: anyhow::Error,
    },
}

impl CacheError {
    /// Wraps a compute function error for the given key.
    pub fn compute(key: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        CacheError::Compute {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Returns the key the failed operation was working on.
    pub fn key(&self) -> &str {
        match self {
            CacheError::Compute { key, .. } => key,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
