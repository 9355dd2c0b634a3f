use crate::{
    job::{Event, Job, RawResult},
    predicate::Predicate,
};
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Shared end of the job queue. Workers take turns receiving from it, so a
/// job always goes to whichever worker is free first.
pub type JobQueue<K> = Arc<Mutex<mpsc::Receiver<Job<K>>>>;

/// Worker task responsible for evaluating the predicate on [`Job`]s.
///
/// The worker pulls one job at a time from the shared queue, awaits the
/// predicate and reports a [`RawResult`] to the coordinator. It runs until the
/// job queue is closed and drained, until the coordinator is gone, or until
/// `fault` is cancelled because a worker panicked.
///
/// This function is designed to be spawned as a Tokio task.
///
/// # Arguments
///
/// - `_worker_id`: Index of this worker (used for logs/tracing).
/// - `jobs`: Shared receiver of the bounded job queue.
/// - `predicate`: The check to apply, shared by every worker.
/// - `events`: Channel to the coordinator.
/// - `fault`: Pool-wide token, cancelled by the first worker whose predicate
///   panics.
///
/// # Panics
///
/// A panicking predicate takes the worker down with it after cancelling
/// `fault`, which stops the other workers from picking up new jobs. The panic
/// surfaces when the pool is joined.
#[allow(clippy::used_underscore_binding)]
pub async fn worker_loop<K, P>(
    _worker_id: usize,
    jobs: JobQueue<K>,
    predicate: Arc<P>,
    events: mpsc::Sender<Event<K>>,
    fault: CancellationToken,
) where
    K: Send + Sync + 'static,
    P: Predicate<K>,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started");

    loop {
        // Hold the lock only while waiting for the next job, never while the
        // predicate runs.
        let next = tokio::select! {
            biased;
            () = fault.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Worker {_worker_id} stopping after a fault in the pool");
                break;
            }
            next = async { jobs.lock().await.recv().await } => next,
        };
        let Some(Job { seq, key }) = next else {
            #[cfg(feature = "tracing")]
            tracing::trace!("Worker {_worker_id} found the job queue closed");
            break;
        };

        let valid = match AssertUnwindSafe(predicate.check(&key)).catch_unwind().await {
            Ok(valid) => valid,
            Err(payload) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker {_worker_id} panicked on seq {seq}, stopping the pool");
                fault.cancel();
                std::panic::resume_unwind(payload);
            }
        };

        if let Err(_e) = events
            .send(Event::Completed(RawResult { seq, key, valid }))
            .await
        {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} failed to report result: {_e}");
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}
