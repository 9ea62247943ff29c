//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{DEFAULT_BETA, DEFAULT_SWEEP_INTERVAL};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval in seconds between store sweeps, 0 disables sweeping
    pub sweep_interval: u64,
    /// Aggressiveness of early recomputation, 0 recomputes only at expiry
    pub beta: f64,
    /// Whether to skip refreshes for keys that already have one running
    pub dedupe_refreshes: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_INTERVAL` - Store sweep frequency in seconds (default: 60)
    /// - `RECOMPUTE_BETA` - Early recomputation aggressiveness (default: 1.0)
    /// - `DEDUPE_REFRESHES` - Skip duplicate refreshes (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            beta: Some(env_or("RECOMPUTE_BETA", defaults.beta))
                .filter(|beta| is_valid_beta(*beta))
                .unwrap_or(defaults.beta),
            dedupe_refreshes: env_or("DEDUPE_REFRESHES", defaults.dedupe_refreshes),
        }
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL.as_secs(),
            beta: DEFAULT_BETA,
            dedupe_refreshes: false,
        }
    }
}

/// Reads and parses `name`, falling back to `default` when unset or invalid.
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Beta must be a finite, non-negative number.
pub fn is_valid_beta(beta: f64) -> bool {
    beta.is_finite() && beta >= 0.0
}
