//! Background Tasks Module
//!
//! Contains background tasks the cache engine runs on the tokio runtime.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at configured intervals

mod cleanup;

pub(crate) use cleanup::spawn_cleanup_task;
