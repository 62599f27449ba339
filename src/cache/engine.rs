//! Cache Engine Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! expiration and coalescing of in-flight computations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{
    CacheEntry, CacheStats, Computation, EntryValue, IntoComputation, LruTracker, PendingValue,
};
use crate::config::CacheConfig;
use crate::tasks::spawn_cleanup_task;

/// What a caller gets back from a populated key.
enum Slot<V, E> {
    /// Settled value, returned as is
    Settled(V),
    /// In-flight computation and the generation of the entry holding it
    InFlight(PendingValue<V, E>, u64),
}

// == Engine State ==
/// Everything guarded by the engine's mutex.
///
/// Each public engine method runs as a single critical section over this
/// state; the lock is never held across an `.await`.
pub(crate) struct EngineState<V, E> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V, E>>,
    /// Recency order, head = least recently used
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// TTL for calls without an override, zero = never expire
    default_ttl: Duration,
    /// Housekeeping interval, zero = no background sweep
    cleanup_interval: Duration,
    /// Optional entry bound
    max_entries: Option<usize>,
    /// Active housekeeping task
    cleanup: Option<JoinHandle<()>>,
    /// Last generation handed out
    next_generation: u64,
}

impl<V: Clone, E: Clone> EngineState<V, E> {
    fn new(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            default_ttl: config.ttl,
            cleanup_interval: config.cleanup_interval,
            max_entries: config.max_entries,
            cleanup: None,
            next_generation: 0,
        }
    }

    // == Lookup ==
    /// Returns the live slot for `key`, touching it, or None on a miss.
    ///
    /// Expired entries that the sweep has not reached yet count as misses.
    fn lookup(&mut self, key: &str, now: Instant) -> Option<Slot<V, E>> {
        let slot = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => match &entry.value {
                EntryValue::Ready(value) => Slot::Settled(value.clone()),
                EntryValue::Pending(handle) => Slot::InFlight(handle.clone(), entry.generation),
            },
            _ => {
                self.stats.record_miss();
                return None;
            }
        };

        match slot {
            Slot::Settled(_) => self.stats.record_hit(),
            Slot::InFlight(..) => self.stats.record_coalesced(),
        }
        self.lru.touch(key);
        Some(slot)
    }

    // == Insert ==
    /// Inserts or overwrites `key`, returning the new entry's generation.
    ///
    /// Overwrites reset recency without evicting; new keys make room first.
    fn insert(
        &mut self,
        key: String,
        value: EntryValue<V, E>,
        ttl: Option<Duration>,
        now: Instant,
    ) -> u64 {
        if self.remove(&key).is_none() {
            self.evict_for_insert();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl), now, generation);

        self.lru.touch(&key);
        self.entries.insert(key, entry);
        self.stats.set_total_entries(self.entries.len());
        generation
    }

    // == Evict For Insert ==
    /// Evicts resolved entries, least recently used first, until there is
    /// room for one more key.
    ///
    /// Pending entries are skipped. When only pending entries remain the loop
    /// gives up and the caller overflows the bound.
    fn evict_for_insert(&mut self) {
        let Some(max_entries) = self.max_entries else {
            return;
        };

        while self.entries.len() >= max_entries {
            let entries = &self.entries;
            let victim = self
                .lru
                .iter()
                .find(|key| entries.get(*key).is_some_and(|entry| entry.is_resolved()))
                .map(str::to_string);

            match victim {
                Some(key) => {
                    self.remove(&key);
                    self.stats.record_eviction();
                    debug!("LRU eviction: removed {}", key);
                }
                None => {
                    debug!(
                        "LRU eviction: all {} entries pending, exceeding max of {}",
                        self.entries.len(),
                        max_entries
                    );
                    break;
                }
            }
        }
    }

    // == Remove ==
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V, E>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Clear ==
    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
        self.stop_cleanup_if_empty();
    }

    // == Settle ==
    /// Applies the outcome of the computation inserted as `generation`.
    ///
    /// Idempotent, and a no-op once the key has been replaced or removed.
    fn settle(&mut self, key: &str, generation: u64, outcome: &Result<V, E>) {
        let current = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation && !entry.is_resolved());
        if !current {
            return;
        }

        match outcome {
            Ok(value) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.value = EntryValue::Ready(value.clone());
                }
                debug!("Computation settled: {}", key);
            }
            Err(_) => {
                self.remove(key);
                self.stats.record_failure();
                warn!("Computation failed, dropped entry: {}", key);
                self.stop_cleanup_if_empty();
            }
        }
    }

    // == Sweep Expired ==
    /// Removes every entry expired at `now`, pending or not.
    ///
    /// Returns the number of entries removed.
    fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove(key);
        }

        self.stats.record_expirations(expired_keys.len());
        expired_keys.len()
    }

    /// One housekeeping pass: sweep, then stop the task if nothing is left.
    pub(crate) fn run_housekeeping(&mut self) -> usize {
        let removed = self.sweep_expired(Instant::now());
        self.stop_cleanup_if_empty();
        removed
    }

    // == Housekeeping Lifecycle ==
    fn ensure_cleanup(&mut self, state: Weak<Mutex<Self>>)
    where
        V: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        if self.cleanup_interval.is_zero() || self.entries.is_empty() || self.is_cleanup_running()
        {
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                self.cleanup = Some(spawn_cleanup_task(state, self.cleanup_interval, &runtime));
            }
            Err(_) => debug!("No tokio runtime, TTL cleanup task not started"),
        }
    }

    fn stop_cleanup_if_empty(&mut self) {
        if !self.entries.is_empty() {
            return;
        }
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
            debug!("Cache empty, TTL cleanup task stopped");
        }
    }

    fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V, E> Drop for EngineState<V, E> {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }
}

// == Cache Engine ==
/// Memoizing cache with request coalescing, TTL expiration and LRU eviction.
///
/// Cloning is cheap and every clone shares the same entries.
pub struct CacheEngine<V, E> {
    inner: Arc<Mutex<EngineState<V, E>>>,
}

impl<V, E> Clone for CacheEngine<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> CacheEngine<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a new engine from a validated configuration.
    pub fn new(config: CacheConfig) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(EngineState::new(&config))),
        })
    }

    /// Creates an unbounded engine with a one hour TTL and a five minute sweep.
    pub fn with_defaults() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineState::new(&CacheConfig::default()))),
        }
    }

    // == Get ==
    /// Returns the cached value for `key`, computing it on a miss.
    ///
    /// Concurrent callers for the same key share one computation. A failed
    /// computation is removed from the cache and its error handed to every
    /// waiting caller. `ttl` overrides the default; zero never expires.
    pub async fn get<C>(&self, key: &str, computation: C, ttl: Option<Duration>) -> Result<V, E>
    where
        C: IntoComputation<V, E>,
    {
        let slot = {
            let mut state = self.inner.lock();
            match state.lookup(key, Instant::now()) {
                Some(slot) => slot,
                None => self.insert_locked(
                    &mut state,
                    key.to_string(),
                    computation.into_computation(),
                    ttl,
                ),
            }
        };

        let (handle, generation) = match slot {
            Slot::Settled(value) => return Ok(value),
            Slot::InFlight(handle, generation) => (handle, generation),
        };

        let outcome = handle.await;
        self.inner.lock().settle(key, generation, &outcome);
        outcome
    }

    // == Set ==
    /// Stores a settled value, overwriting any existing entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let mut state = self.inner.lock();
        self.insert_locked(&mut state, key.into(), Computation::Ready(value), ttl);
    }

    /// Stores a computation without awaiting it, overwriting any existing entry.
    ///
    /// The entry becomes evictable once the future settles, and is removed
    /// if it fails.
    pub fn set_future<F>(&self, key: impl Into<String>, future: F, ttl: Option<Duration>)
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut state = self.inner.lock();
        self.insert_locked(&mut state, key.into(), Computation::future(future), ttl);
    }

    // == Delete ==
    /// Removes an entry. Returns false if the key was absent.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.inner.lock();
        let removed = state.remove(key).is_some();
        state.stop_cleanup_if_empty();
        if removed {
            debug!("Deleted: {}", key);
        }
        removed
    }

    // == Clear ==
    /// Drops every entry and stops housekeeping.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    // == Cleanup Expired ==
    /// Runs a housekeeping sweep now. Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        self.inner.lock().run_housekeeping()
    }

    // == Queries ==
    /// Returns the current number of entries, expired-but-unswept included.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Snapshot of the keys, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().lru.iter().map(str::to_string).collect()
    }

    /// Checks membership without touching recency or expiry.
    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.inner.lock().max_entries
    }

    /// True when bounded and holding at least `max_entries` entries.
    pub fn is_at_capacity(&self) -> bool {
        let state = self.inner.lock();
        state
            .max_entries
            .is_some_and(|max_entries| state.entries.len() >= max_entries)
    }

    /// Returns `Some(false)` while the entry's computation is in flight.
    pub fn is_resolved(&self, key: &str) -> Option<bool> {
        self.inner.lock().entries.get(key).map(CacheEntry::is_resolved)
    }

    /// Remaining TTL of an entry: `None` if absent, `Some(None)` if it never expires.
    pub fn ttl_remaining(&self, key: &str) -> Option<Option<Duration>> {
        self.inner.lock().entries.get(key).map(CacheEntry::ttl_remaining)
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }

    /// Whether the background housekeeping task is alive.
    pub fn is_cleanup_running(&self) -> bool {
        self.inner.lock().is_cleanup_running()
    }

    #[cfg(test)]
    pub(crate) fn shared_state(&self) -> Arc<Mutex<EngineState<V, E>>> {
        Arc::clone(&self.inner)
    }

    // == Internals ==
    /// Normalizes and inserts a computation while the caller holds the lock.
    fn insert_locked(
        &self,
        state: &mut EngineState<V, E>,
        key: String,
        computation: Computation<V, E>,
        ttl: Option<Duration>,
    ) -> Slot<V, E> {
        let value = computation.into_entry_value();
        let generation = state.insert(key.clone(), value.clone(), ttl, Instant::now());
        state.ensure_cleanup(Arc::downgrade(&self.inner));

        match value {
            EntryValue::Ready(value) => {
                debug!("Inserted settled value: {}", key);
                Slot::Settled(value)
            }
            EntryValue::Pending(handle) => {
                debug!("Inserted pending computation: {}", key);
                self.track_settlement(key, generation, handle.clone());
                Slot::InFlight(handle, generation)
            }
        }
    }

    /// Drives a computation to completion even if every caller goes away.
    ///
    /// Without a tokio runtime the computation only progresses while awaited.
    fn track_settlement(&self, key: String, generation: u64, handle: PendingValue<V, E>) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let state = Arc::downgrade(&self.inner);

        runtime.spawn(async move {
            let outcome = handle.await;
            if let Some(state) = state.upgrade() {
                state.lock().settle(&key, generation, &outcome);
            }
        });
    }
}

impl<V, E> std::fmt::Debug for CacheEngine<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("CacheEngine")
            .field("len", &state.entries.len())
            .field("max_entries", &state.max_entries)
            .field("default_ttl", &state.default_ttl)
            .field("cleanup_interval", &state.cleanup_interval)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Cache = CacheEngine<String, String>;

    fn bounded(max_entries: usize) -> Cache {
        CacheEngine::new(CacheConfig::default().with_max_entries(max_entries)).unwrap()
    }

    fn fetch(calls: &Arc<AtomicUsize>, value: &'static str) -> Computation<String, String> {
        let calls = calls.clone();
        Computation::future(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value.to_string())
        })
    }

    fn never_called() -> Computation<String, String> {
        Computation::from_fn(|| -> String { panic!("computation should not run") })
    }

    #[test]
    fn test_engine_new() {
        let cache = Cache::with_defaults();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.max_entries(), None);
        assert!(!cache.is_at_capacity());
        assert!(!cache.is_cleanup_running());
    }

    #[test]
    fn test_engine_rejects_zero_capacity() {
        let result = Cache::new(CacheConfig::default().with_max_entries(0));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = Cache::with_defaults();

        cache.set("key1", "value1".to_string(), None);
        let value = cache.get("key1", never_called(), None).await.unwrap();

        assert_eq!(value, "value1");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_computes_once_then_hits() {
        let cache = Cache::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(cache.get("k", fetch(&calls, "v"), None).await.unwrap(), "v");
        assert_eq!(cache.get("k", fetch(&calls, "other"), None).await.unwrap(), "v");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.is_resolved("k"), Some(true));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_get_accepts_closures_and_values() {
        let cache = Cache::with_defaults();

        let value = cache
            .get("async", || async { Ok::<_, String>("a".to_string()) }, None)
            .await
            .unwrap();
        assert_eq!(value, "a");

        let value = cache
            .get("sync", Computation::from_fn(|| "s".to_string()), None)
            .await
            .unwrap();
        assert_eq!(value, "s");
        assert_eq!(cache.is_resolved("sync"), Some(true));

        let value = cache
            .get("plain", Computation::ready("p".to_string()), None)
            .await
            .unwrap();
        assert_eq!(value, "p");
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let cache = Cache::with_defaults();

        cache.set("key1", "value1".to_string(), None);
        cache.set("key1", "value2".to_string(), None);

        assert_eq!(cache.len(), 1);
        let value = cache.get("key1", never_called(), None).await.unwrap();
        assert_eq!(value, "value2");
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = Cache::with_defaults();

        cache.set("key1", "value1".to_string(), None);
        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));

        assert!(cache.is_empty());
        assert!(!cache.has("key1"));
        assert!(!cache.delete("nonexistent"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_just_before_expiry_hits() {
        let cache = Cache::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Some(Duration::from_millis(100));

        cache.get("k", fetch(&calls, "v"), ttl).await.unwrap();
        tokio::time::advance(Duration::from_millis(99)).await;
        cache.get("k", fetch(&calls, "v"), ttl).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_after_expiry_recomputes() {
        let cache = Cache::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Some(Duration::from_millis(100));

        cache.get("k", fetch(&calls, "v1"), ttl).await.unwrap();
        tokio::time::advance(Duration::from_millis(101)).await;
        let value = cache.get("k", fetch(&calls, "v2"), ttl).await.unwrap();

        assert_eq!(value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = Cache::new(CacheConfig::default().with_ttl(Duration::ZERO)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get("forever", fetch(&calls, "v"), None).await.unwrap();
        assert_eq!(cache.ttl_remaining("forever"), Some(None));

        tokio::time::advance(Duration::from_millis(1_000_000_000)).await;
        cache.get("forever", fetch(&calls, "v"), None).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_override_zero() {
        let cache =
            Cache::new(CacheConfig::default().with_cleanup_interval(Duration::ZERO)).unwrap();

        cache.set("pinned", "v".to_string(), Some(Duration::ZERO));
        cache.set("default", "v".to_string(), None);
        assert_eq!(
            cache.ttl_remaining("default"),
            Some(Some(Duration::from_millis(3_600_000)))
        );

        tokio::time::advance(Duration::from_millis(3_600_000)).await;
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.has("pinned"));
        assert!(!cache.has("default"));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_failure_removes_entry() {
        let cache = Cache::with_defaults();
        cache.set("other", "x".to_string(), None);

        let result = cache
            .get("k", || async { Err::<String, _>("boom".to_string()) }, None)
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(cache.len(), 1);
        assert!(!cache.has("k"));
        assert_eq!(cache.stats().failures, 1);

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.get("k", fetch(&calls, "retry"), None).await.unwrap();
        assert_eq!(value, "retry");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_coalesce() {
        let cache = Cache::with_defaults();
        let calls = Arc::new(AtomicUsize::new(0));

        let requests = (0..5).map(|_| {
            let calls = calls.clone();
            cache.get(
                "shared",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>("computed".to_string())
                },
                None,
            )
        });
        let results = futures::future::join_all(requests).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_deref() == Ok("computed")));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_callers_share_failure() {
        let cache = Cache::with_defaults();

        let requests = (0..3).map(|_| {
            cache.get(
                "flaky",
                || async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<String, _>("unavailable".to_string())
                },
                None,
            )
        });
        let results = futures::future::join_all(requests).await;

        assert!(results
            .iter()
            .all(|r| r == &Err("unavailable".to_string())));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = bounded(3);

        cache.set("key1", "value1".to_string(), None);
        cache.set("key2", "value2".to_string(), None);
        cache.set("key3", "value3".to_string(), None);
        assert!(cache.is_at_capacity());

        // Cache is full, adding key4 should evict key1 (oldest)
        cache.set("key4", "value4".to_string(), None);

        assert_eq!(cache.len(), 3);
        assert!(!cache.has("key1"));
        assert!(cache.has("key2"));
        assert!(cache.has("key3"));
        assert!(cache.has("key4"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_lru_touch_on_get() {
        let cache = bounded(3);

        cache.set("key1", "value1".to_string(), None);
        cache.set("key2", "value2".to_string(), None);
        cache.set("key3", "value3".to_string(), None);

        // Access key1 to make it most recently used
        cache.get("key1", never_called(), None).await.unwrap();

        // Adding key4 should evict key2 (now oldest)
        cache.set("key4", "value4".to_string(), None);

        assert!(cache.has("key1"));
        assert!(!cache.has("key2"));
        assert_eq!(cache.keys(), vec!["key3", "key1", "key4"]);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = bounded(2);

        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), None);
        cache.set("a", "3".to_string(), None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys(), vec!["b", "a"]);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_pending_entries_are_never_evicted() {
        let cache = bounded(2);
        let (tx1, rx1) = oneshot::channel::<String>();
        let (_tx2, rx2) = oneshot::channel::<String>();

        cache.set_future("slow1", async move { rx1.await.map_err(|e| e.to_string()) }, None);
        cache.set_future("slow2", async move { rx2.await.map_err(|e| e.to_string()) }, None);

        // Every entry is pending, so the bound is exceeded instead
        cache.set("c", "c".to_string(), None);
        assert_eq!(cache.len(), 3);
        assert!(cache.has("slow1") && cache.has("slow2") && cache.has("c"));
        assert_eq!(cache.is_resolved("slow1"), Some(false));

        tx1.send("one".to_string()).unwrap();
        let value = cache.get("slow1", never_called(), None).await.unwrap();
        assert_eq!(value, "one");
        assert_eq!(cache.is_resolved("slow1"), Some(true));

        // Order is now slow2, c, slow1; both resolved entries go, slow2 stays
        cache.set("d", "d".to_string(), None);
        assert_eq!(cache.keys(), vec!["slow2", "d"]);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_superseded_computation_does_not_clobber() {
        let cache = Cache::with_defaults();
        let (tx_ok, rx_ok) = oneshot::channel::<String>();
        let (tx_err, rx_err) = oneshot::channel::<String>();

        cache.set_future("k", async move { rx_ok.await.map_err(|e| e.to_string()) }, None);
        cache.set("k", "new".to_string(), None);
        tx_ok.send("old".to_string()).unwrap();

        cache.set_future(
            "j",
            async move {
                match rx_err.await {
                    Ok(reason) => Err::<String, String>(reason),
                    Err(e) => Err(e.to_string()),
                }
            },
            None,
        );
        cache.set("j", "kept".to_string(), None);
        tx_err.send("late failure".to_string()).unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.get("k", never_called(), None).await.unwrap(), "new");
        assert_eq!(cache.get("j", never_called(), None).await.unwrap(), "kept");
        assert_eq!(cache.stats().failures, 0);
    }

    #[tokio::test]
    async fn test_set_future_settles_without_callers() {
        let cache = Cache::with_defaults();
        let (tx, rx) = oneshot::channel::<String>();

        cache.set_future("bg", async move { rx.await.map_err(|e| e.to_string()) }, None);
        tx.send("done".to_string()).unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.is_resolved("bg"), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_get_overwrites_without_eviction() {
        let cache = Cache::new(
            CacheConfig::default()
                .with_max_entries(2)
                .with_cleanup_interval(Duration::ZERO),
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set("a", "old".to_string(), Some(Duration::from_millis(100)));
        cache.set("b", "b".to_string(), None);
        tokio::time::advance(Duration::from_millis(200)).await;

        let value = cache.get("a", fetch(&calls, "fresh"), None).await.unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(cache.keys(), vec!["b", "a"]);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_lifecycle() {
        let cache = Cache::new(CacheConfig::default().with_cleanup_interval(Duration::from_secs(1)))
            .unwrap();
        assert!(!cache.is_cleanup_running());

        cache.set("short", "v".to_string(), Some(Duration::from_millis(500)));
        assert!(cache.is_cleanup_running());

        // The sweep at 1s removes the entry and stops the task
        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert!(cache.is_empty());
        assert!(!cache.is_cleanup_running());
        assert_eq!(cache.stats().expirations, 1);

        // A new insertion starts a fresh task
        cache.set("again", "v".to_string(), None);
        assert!(cache.is_cleanup_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_sweeps_pending_entries() {
        let cache = Cache::new(CacheConfig::default().with_cleanup_interval(Duration::from_secs(1)))
            .unwrap();
        let (_tx, rx) = oneshot::channel::<String>();

        cache.set_future(
            "stuck",
            async move { rx.await.map_err(|e| e.to_string()) },
            Some(Duration::from_millis(100)),
        );
        cache.set("stays", "v".to_string(), None);

        tokio::time::sleep(Duration::from_millis(1001)).await;

        assert!(!cache.has("stuck"));
        assert!(cache.has("stays"));
        assert!(cache.is_cleanup_running());
    }

    #[tokio::test]
    async fn test_delete_and_clear_stop_cleanup() {
        let cache = Cache::with_defaults();

        cache.set("a", "1".to_string(), None);
        cache.set("b", "2".to_string(), None);
        assert!(cache.is_cleanup_running());

        cache.delete("a");
        assert!(cache.is_cleanup_running());
        cache.delete("b");
        assert!(!cache.is_cleanup_running());

        cache.set("c", "3".to_string(), None);
        assert!(cache.is_cleanup_running());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        assert!(!cache.is_cleanup_running());
    }

    #[tokio::test]
    async fn test_zero_interval_disables_cleanup() {
        let cache =
            Cache::new(CacheConfig::default().with_cleanup_interval(Duration::ZERO)).unwrap();

        cache.set("a", "1".to_string(), None);
        assert!(!cache.is_cleanup_running());
    }

    #[test]
    fn test_works_without_runtime() {
        let cache = Cache::with_defaults();

        cache.set("plain", "v".to_string(), None);
        cache.set_future("later", async { Ok("computed".to_string()) }, None);
        assert!(!cache.is_cleanup_running());
        assert_eq!(cache.is_resolved("later"), Some(false));

        let value = futures::executor::block_on(cache.get("later", never_called(), None));
        assert_eq!(value, Ok("computed".to_string()));
        assert_eq!(cache.is_resolved("later"), Some(true));
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = Cache::with_defaults();
        let other = cache.clone();

        cache.set("k", "v".to_string(), None);
        assert!(other.has("k"));
        assert_eq!(other.get("k", never_called(), None).await.unwrap(), "v");
    }
}
