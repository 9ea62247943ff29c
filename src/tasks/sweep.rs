//! Store Sweep Task
//!
//! Background task that periodically purges expired values from a
//! [`MemoryStore`]. Expired values are already invisible to readers; the
//! sweep only reclaims their memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::MemoryStore;

/// Spawns a background task that periodically sweeps expired values.
///
/// The task only keeps a weak reference to the store and stops on its own
/// once the store is dropped.
///
/// # Arguments
/// * `store` - The store to sweep
/// * `interval` - Time between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown. `None` when `interval` is zero or no Tokio runtime is
/// running.
///
/// # Example
/// ```ignore
/// let store = Arc::new(MemoryStore::new());
/// let sweep_handle = spawn_sweep_task(&store, Duration::from_secs(60));
/// // Later, during shutdown:
/// if let Some(handle) = sweep_handle {
///     handle.abort();
/// }
/// ```
pub fn spawn_sweep_task<T>(
    store: &Arc<MemoryStore<T>>,
    interval: Duration,
) -> Option<JoinHandle<()>>
where
    T: Send + Sync + 'static,
{
    if interval.is_zero() {
        debug!("Store sweep disabled");
        return None;
    }

    let Ok(runtime) = Handle::try_current() else {
        warn!("No Tokio runtime available, store sweep not started");
        return None;
    };

    let store = Arc::downgrade(store);
    Some(runtime.spawn(async move {
        info!("Starting store sweep task with interval of {:?}", interval);

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(store) = store.upgrade() else {
                debug!("Store dropped, stopping sweep task");
                break;
            };

            let removed = store.cleanup_expired().await;

            if removed > 0 {
                info!("Store sweep: removed {} expired values", removed);
            } else {
                debug!("Store sweep: no expired values found");
            }
        }
    }))
}
