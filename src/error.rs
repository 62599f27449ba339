//! Error types for the cache
//!
//! Provides unified error handling using thiserror.
//!
//! Computation failures are not represented here: they are surfaced to callers
//! verbatim as the caller-chosen error type of [`crate::cache::CacheEngine`].

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache construction and configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A configuration value could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
