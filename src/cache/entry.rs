//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support and
//! the pending/settled value they hold.

use std::fmt;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

/// A computation shared by every caller waiting on the same key.
pub type PendingValue<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

// == Entry Value ==
/// The value slot of an entry: still in flight, or settled.
#[derive(Clone)]
pub enum EntryValue<V, E> {
    /// Settled successfully
    Ready(V),
    /// Computation has not settled yet
    Pending(PendingValue<V, E>),
}

impl<V: fmt::Debug, E> fmt::Debug for EntryValue<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryValue::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            EntryValue::Pending(_) => f.write_str("Pending"),
        }
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V, E> {
    /// The stored value or in-flight computation
    pub value: EntryValue<V, E>,
    /// Insertion instant
    pub created_at: Instant,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
    /// Insertion sequence number, distinguishes an entry from its replacements
    pub generation: u64,
}

impl<V, E> CacheEntry<V, E> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` after `now`.
    ///
    /// A zero `ttl` never expires.
    pub fn new(value: EntryValue<V, E>, ttl: Duration, now: Instant, generation: u64) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };

        Self {
            value,
            created_at: now,
            expires_at,
            generation,
        }
    }

    // == Is Resolved ==
    /// Returns true once the computation behind this entry has settled.
    ///
    /// Only resolved entries are eligible for LRU eviction.
    pub fn is_resolved(&self) -> bool {
        matches!(self.value, EntryValue::Ready(_))
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired when `now >= expires_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// Checks if the entry has expired at the current instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns the remaining TTL, or None if the entry never expires.
    ///
    /// Returns `Some(Duration::ZERO)` once the TTL has elapsed.
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}
