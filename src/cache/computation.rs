//! Computation Module
//!
//! Normalizes everything a caller can hand to the cache (a value, a closure
//! producing a value, a future, or a closure producing a future) into a single
//! entry value.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::cache::EntryValue;

// == Computation ==
/// The work backing a cache entry.
///
/// Closures are only invoked when the cache misses.
pub enum Computation<V, E> {
    /// An already available value
    Ready(V),
    /// A synchronous closure producing the value
    Deferred(Box<dyn FnOnce() -> V + Send>),
    /// An asynchronous computation
    Future(BoxFuture<'static, Result<V, E>>),
}

impl<V, E> Computation<V, E> {
    /// Wraps a plain value.
    pub fn ready(value: V) -> Self {
        Computation::Ready(value)
    }

    /// Wraps a synchronous closure.
    ///
    /// The closure runs while the cache is locked and must not call back into
    /// the same cache.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> V + Send + 'static,
    {
        Computation::Deferred(Box::new(f))
    }

    /// Wraps a bare future.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<V, E>> + Send + 'static,
    {
        Computation::Future(future.boxed())
    }

    /// Runs synchronous work and makes asynchronous work shareable.
    pub(crate) fn into_entry_value(self) -> EntryValue<V, E>
    where
        V: Clone,
        E: Clone,
    {
        match self {
            Computation::Ready(value) => EntryValue::Ready(value),
            Computation::Deferred(f) => EntryValue::Ready(f()),
            Computation::Future(future) => EntryValue::Pending(future.shared()),
        }
    }
}

// == Into Computation ==
/// Conversion into a [`Computation`], accepted by [`crate::cache::CacheEngine::get`].
pub trait IntoComputation<V, E> {
    fn into_computation(self) -> Computation<V, E>;
}

impl<V, E> IntoComputation<V, E> for Computation<V, E> {
    fn into_computation(self) -> Computation<V, E> {
        self
    }
}

/// Closures returning a future are called lazily, on the computation's first poll.
impl<V, E, F, Fut> IntoComputation<V, E> for F
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    fn into_computation(self) -> Computation<V, E> {
        let f = self;
        Computation::Future(async move { f().await }.boxed())
    }
}
