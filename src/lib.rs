//! Memo Cache - An in-process memoizing cache
//!
//! Coalesces concurrent requests for the same key into one computation, with
//! TTL expiration and optional LRU eviction.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheEngine, CacheStats, Computation, IntoComputation};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
