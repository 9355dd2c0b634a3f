//! The caller-supplied check applied to every submitted key.
//!
//! A [`Predicate`] may perform I/O and is called concurrently from up to
//! `concurrency` workers. It must fold its own failures into `false`; the
//! broker never distinguishes "invalid" from "check errored".

use core::future::Future;
use std::sync::Arc;

/// Boolean check applied to each key.
pub trait Predicate<K>: Send + Sync + 'static {
    /// Returns whether `key` passes the check.
    fn check(&self, key: &K) -> impl Future<Output = bool> + Send;
}

impl<K, P> Predicate<K> for Arc<P>
where
    P: Predicate<K>,
{
    fn check(&self, key: &K) -> impl Future<Output = bool> + Send {
        (**self).check(key)
    }
}

/// Predicate built from an async closure taking an owned key.
///
/// Created by [`from_fn`].
#[derive(Clone, Debug)]
pub struct FnPredicate<F> {
    f: F,
}

/// Wraps an async closure as a [`Predicate`].
///
/// The key is cloned for every call so the returned future does not borrow
/// from the worker.
pub fn from_fn<K, F, Fut>(f: F) -> FnPredicate<F>
where
    K: Clone + Send + Sync,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send,
{
    FnPredicate { f }
}

impl<K, F, Fut> Predicate<K> for FnPredicate<F>
where
    K: Clone + Send + Sync,
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send,
{
    fn check(&self, key: &K) -> impl Future<Output = bool> + Send {
        (self.f)(key.clone())
    }
}

/// Predicate built from a synchronous, possibly blocking, closure.
///
/// Created by [`from_blocking_fn`]. Each call runs on Tokio's blocking thread
/// pool so slow I/O inside the closure never stalls the async workers.
#[derive(Debug)]
pub struct BlockingPredicate<F> {
    f: Arc<F>,
}

/// Wraps a synchronous closure as a [`Predicate`].
///
/// A panic inside the closure is re-raised on the calling worker.
pub fn from_blocking_fn<K, F>(f: F) -> BlockingPredicate<F>
where
    K: Clone + Send + Sync + 'static,
    F: Fn(&K) -> bool + Send + Sync + 'static,
{
    BlockingPredicate { f: Arc::new(f) }
}

impl<K, F> Predicate<K> for BlockingPredicate<F>
where
    K: Clone + Send + Sync + 'static,
    F: Fn(&K) -> bool + Send + Sync + 'static,
{
    fn check(&self, key: &K) -> impl Future<Output = bool> + Send {
        let f = Arc::clone(&self.f);
        let key = key.clone();
        async move {
            match tokio::task::spawn_blocking(move || f(&key)).await {
                Ok(valid) => valid,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                // The runtime is shutting down; nothing meaningful to report.
                Err(_) => false,
            }
        }
    }
}
