//! Worker pool lifecycle.
//!
//! This module defines the [`WorkerPool`] struct, which owns the join handles
//! of `concurrency` worker tasks. Unlike a round-robin dispatcher, every
//! worker pulls from the same bounded job queue, so a slow predicate call
//! never holds up jobs that another idle worker could take.
//!
//! The pool has no shutdown message of its own: closing the job queue (by
//! dropping its sender) is the signal, and [`WorkerPool::join`] waits for
//! every worker to drain it and exit.
//!
//! A predicate panic is fatal to the whole pool. The panicking worker cancels
//! the shared fault [`CancellationToken`]; the other workers stop taking jobs
//! and the broker refuses further submissions, so nothing piles up behind a
//! result that will never arrive.

use super::worker::{JobQueue, worker_loop};
use crate::{
    job::{Event, Job},
    predicate::Predicate,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// A fixed set of worker tasks sharing one job queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    fault: CancellationToken,
}

impl WorkerPool {
    /// Spawns `concurrency` workers on the current Tokio runtime.
    ///
    /// Each worker gets its own clone of the coordinator sender; the pool
    /// keeps none, so the coordinator channel closes once every worker has
    /// exited and the broker has dropped its own sender.
    pub fn spawn<K, P>(
        concurrency: usize,
        jobs: mpsc::Receiver<Job<K>>,
        predicate: Arc<P>,
        events: &mpsc::Sender<Event<K>>,
    ) -> Self
    where
        K: Send + Sync + 'static,
        P: Predicate<K>,
    {
        let jobs: JobQueue<K> = Arc::new(tokio::sync::Mutex::new(jobs));
        let fault = CancellationToken::new();
        let handles = (0..concurrency)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&jobs),
                    Arc::clone(&predicate),
                    events.clone(),
                    fault.clone(),
                ))
            })
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {concurrency} workers");

        Self { handles, fault }
    }

    /// Token cancelled as soon as a predicate panics on any worker.
    pub fn fault(&self) -> CancellationToken {
        self.fault.clone()
    }

    /// Waits for every worker to exit.
    ///
    /// Must be called after the job queue has been closed, otherwise it waits
    /// forever.
    ///
    /// # Panics
    ///
    /// Re-raises the first panic raised by a predicate on any worker, after
    /// all workers have finished.
    pub async fn join(self) {
        let results = futures::future::join_all(self.handles).await;

        let mut first_panic = None;
        for (_worker_id, result) in results.into_iter().enumerate() {
            match result {
                Ok(()) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_worker_id} joined");
                }
                Err(e) if e.is_panic() => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_worker_id} panicked");
                    first_panic.get_or_insert(e.into_panic());
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_worker_id} was cancelled: {_e}");
                }
            }
        }

        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool shutdown complete");
    }
}
