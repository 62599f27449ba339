//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::EngineState;

/// Spawns a background task that periodically cleans up expired cache entries.
///
/// The task sleeps for `interval` between sweeps and holds only a weak
/// reference to the engine state, so it ends once the engine is dropped. The
/// engine aborts it through the returned handle when the cache becomes empty.
pub(crate) fn spawn_cleanup_task<V, E>(
    state: Weak<Mutex<EngineState<V, E>>>,
    interval: Duration,
    runtime: &Handle,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    runtime.spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let Some(state) = state.upgrade() else {
                debug!("Cache dropped, TTL cleanup task exiting");
                break;
            };

            let removed = state.lock().run_housekeeping();

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
