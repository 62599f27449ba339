//! Memo Cache demo
//!
//! Exercises the cache the way a service would: many concurrent requests for
//! the same slow lookup, a failing lookup, and a statistics dump.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memo_cache::{CacheConfig, CacheEngine};

/// Main entry point for the Memo Cache demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache engine
/// 4. Fire concurrent requests for one key and report how many fetches ran
/// 5. Fire a failing request and show it is not cached
/// 6. Log the cache statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memo_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Memo Cache demo");

    let config = CacheConfig::from_env()?;
    info!(
        "Configuration loaded: ttl={}ms, cleanup_interval={}ms, max_entries={:?}",
        config.ttl.as_millis(),
        config.cleanup_interval.as_millis(),
        config.max_entries
    );

    let cache: CacheEngine<String, String> = CacheEngine::new(config)?;
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut requests = Vec::new();
    for caller in 0..8 {
        let cache = cache.clone();
        let fetches = fetches.clone();
        requests.push(tokio::spawn(async move {
            let profile = cache
                .get("user:42", move || fetch_profile(fetches, 42), None)
                .await;
            (caller, profile)
        }));
    }

    for request in requests {
        let (caller, profile) = request.await?;
        match profile {
            Ok(profile) => info!("Caller {} received {}", caller, profile),
            Err(err) => warn!("Caller {} failed: {}", caller, err),
        }
    }
    info!(
        "{} concurrent callers triggered {} fetch(es)",
        8,
        fetches.load(Ordering::SeqCst)
    );

    let failed = cache
        .get(
            "user:0",
            || async { Err::<String, _>("user 0 does not exist".to_string()) },
            None,
        )
        .await;
    if let Err(err) = failed {
        warn!("Lookup failed: {} (cached: {})", err, cache.has("user:0"));
    }

    info!("Cache stats: {}", serde_json::to_string(&cache.stats())?);
    info!("Keys: {:?}", cache.keys());

    cache.clear();
    info!("Demo complete");
    Ok(())
}

/// Simulates a slow upstream lookup.
async fn fetch_profile(fetches: Arc<AtomicUsize>, id: u32) -> Result<String, String> {
    fetches.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(format!("{{\"id\":{},\"name\":\"user-{}\"}}", id, id))
}
