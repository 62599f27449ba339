//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default time-to-live applied when a call does not override it (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_millis(3_600_000);

/// Default interval between housekeeping sweeps (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(300_000);

/// Cache configuration parameters.
///
/// A zero `ttl` means entries never expire. A zero `cleanup_interval` disables
/// the background sweep. `max_entries` of `None` leaves the cache unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Default TTL for entries without an explicit TTL
    pub ttl: Duration,
    /// Interval between background expiry sweeps
    pub cleanup_interval: Duration,
    /// Maximum number of entries before LRU eviction kicks in
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Default TTL in milliseconds (default: 3600000, 0 = never expire)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Sweep interval in milliseconds (default: 300000, 0 = off)
    /// - `CACHE_MAX_ENTRIES` - Maximum entries (default: unbounded)
    ///
    /// Unset variables fall back to defaults; unparseable ones are rejected.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let ttl = parse_var(&lookup, "CACHE_TTL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.ttl);
        let cleanup_interval = parse_var(&lookup, "CACHE_CLEANUP_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.cleanup_interval);
        let max_entries = parse_var::<usize, _>(&lookup, "CACHE_MAX_ENTRIES")?;

        let config = Self {
            ttl,
            cleanup_interval,
            max_entries,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the housekeeping interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Bounds the cache to `max_entries` entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Checks the configuration for values the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_entries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_entries: None,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CacheError::InvalidConfig(format!("{}={}", name, raw))),
    }
}
