//! Cache Module
//!
//! Provides an in-memory memoizing cache with request coalescing, TTL
//! expiration and LRU eviction.

mod computation;
mod engine;
mod entry;
mod lru;
mod stats;


// Re-export public types
pub use computation::{Computation, IntoComputation};
pub use engine::CacheEngine;
pub use entry::{CacheEntry, EntryValue, PendingValue};
pub use lru::LruTracker;
pub use stats::CacheStats;

pub(crate) use engine::EngineState;
