//! Broker facade wiring the job queue, the worker pool and the coordinator.
//!
//! ## Responsibilities
//!
//! - Spawn the worker pool and the coordinator task.
//! - Tag each submission with its sequence number and hand it to both the
//!   coordinator (Submission Queue) and the workers (job queue).
//! - Hand out the ordered output stream.
//! - Run the `Open -> Draining -> Closed` shutdown protocol.

use crate::{
    coordinator::task::coordinator_loop,
    error::{Error, Result},
    job::{Event, Job, Seq, Verdict},
    pool::WorkerPool,
    predicate::Predicate,
};
use core::fmt;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Ordered stream of `(key, result)` pairs, in submission order. Ends once
/// the broker has fully shut down.
pub type ResultStream<K> = ReceiverStream<Verdict<K>>;

/// Construction parameters for a [`Broker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Number of workers, and capacity of the job queue. This is the only
    /// admission-control knob: at most `concurrency` predicate calls run at
    /// once, and `submit` blocks once `concurrency` more are queued.
    pub concurrency: usize,
    /// Capacity of the ordered output channel. When the consumer falls this
    /// far behind, the coordinator stops releasing results.
    pub output_buffer: usize,
}

impl BrokerConfig {
    /// A config with the output buffer sized like the job queue.
    pub const fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            output_buffer: concurrency,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig {
                reason: "concurrency must be greater than 0".to_string(),
            });
        }
        if self.output_buffer == 0 {
            return Err(Error::InvalidConfig {
                reason: "output buffer must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Lifecycle of a [`Broker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerState {
    /// Accepting submissions.
    Open,
    /// `shutdown` has begun; in-flight jobs are finishing.
    Draining,
    /// Every result has been released and the output stream is closed.
    Closed,
}

/// Concurrent validation broker with in-order result release.
///
/// Keys are checked by up to `concurrency` workers at once, complete in any
/// order, and come back out of [`results`](Self::results) in exactly the
/// order they were submitted.
///
/// `submit` and `shutdown` take `&mut self`: the broker expects a single
/// producer. The result stream is expected to be consumed concurrently by a
/// single consumer; if nobody reads it, the pipeline stalls once the output
/// buffer, the coordinator channel and the job queue are full.
///
/// # Example
///
/// ```ignore
/// let mut broker = Broker::new(8, from_fn(|key: String| async move { !key.is_empty() }))?;
/// let results = broker.results()?;
/// let consumer = tokio::spawn(results.collect::<Vec<_>>());
/// for key in keys {
///     broker.submit(key).await?;
/// }
/// broker.shutdown().await?;
/// let verdicts = consumer.await?;
/// ```
pub struct Broker<K> {
    state: BrokerState,
    next_seq: Seq,
    jobs: Option<mpsc::Sender<Job<K>>>,
    events: Option<mpsc::Sender<Event<K>>>,
    pool: Option<WorkerPool>,
    fault: CancellationToken,
    coordinator: Option<JoinHandle<()>>,
    results: Option<mpsc::Receiver<Verdict<K>>>,
}

impl<K> Broker<K>
where
    K: Clone + Eq + fmt::Debug + Send + Sync + 'static,
{
    /// Creates a broker with `concurrency` workers running `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `concurrency` is zero.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<P>(concurrency: usize, predicate: P) -> Result<Self>
    where
        P: Predicate<K>,
    {
        Self::with_config(BrokerConfig::new(concurrency), predicate)
    }

    /// Creates a broker from a full [`BrokerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any capacity is zero.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_config<P>(config: BrokerConfig, predicate: P) -> Result<Self>
    where
        P: Predicate<K>,
    {
        config.validate()?;

        let (jobs_tx, jobs_rx) = mpsc::channel(config.concurrency);
        let (events_tx, events_rx) = mpsc::channel(config.concurrency);
        let (output_tx, output_rx) = mpsc::channel(config.output_buffer);

        let coordinator = tokio::spawn(coordinator_loop(events_rx, output_tx));
        let pool = WorkerPool::spawn(config.concurrency, jobs_rx, Arc::new(predicate), &events_tx);
        let fault = pool.fault();

        #[cfg(feature = "tracing")]
        tracing::debug!("Broker open with {config:?}");

        Ok(Self {
            state: BrokerState::Open,
            next_seq: 0,
            jobs: Some(jobs_tx),
            events: Some(events_tx),
            pool: Some(pool),
            fault,
            coordinator: Some(coordinator),
            results: Some(output_rx),
        })
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> BrokerState {
        self.state
    }

    /// Number of keys accepted so far.
    pub const fn submitted(&self) -> u64 {
        self.next_seq
    }

    /// Takes the ordered output stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResultsTaken`] if the stream was already taken.
    pub fn results(&mut self) -> Result<ResultStream<K>> {
        self.results
            .take()
            .map(ReceiverStream::new)
            .ok_or(Error::ResultsTaken)
    }

    /// Submits a key for validation.
    ///
    /// Waits while the job queue is full; this is the broker's backpressure.
    /// The future is cancel-safe: if it is dropped before completing, the key
    /// was not submitted.
    ///
    /// # Errors
    ///
    /// - [`Error::BrokerClosed`] once `shutdown` has begun.
    /// - [`Error::ChannelError`] once a predicate has panicked on a worker,
    ///   or if every worker or the coordinator has died. Call `shutdown` to
    ///   re-raise the panic.
    pub async fn submit(&mut self, key: K) -> Result<()> {
        if self.state != BrokerState::Open {
            return Err(Error::BrokerClosed);
        }
        let (Some(jobs), Some(events)) = (&self.jobs, &self.events) else {
            return Err(Error::BrokerClosed);
        };
        if self.fault.is_cancelled() {
            return Err(worker_fault());
        }

        // Reserve both slots before sending anything so that cancellation
        // can never leave a submission without its job, or the reverse.
        let job_slot = tokio::select! {
            biased;
            () = self.fault.cancelled() => return Err(worker_fault()),
            slot = jobs.reserve() => slot.map_err(|_| Error::ChannelError {
                context: "job queue closed: every worker has exited".to_string(),
            })?,
        };
        let event_slot = tokio::select! {
            biased;
            () = self.fault.cancelled() => return Err(worker_fault()),
            slot = events.reserve() => slot.map_err(|_| Error::ChannelError {
                context: "coordinator has exited".to_string(),
            })?,
        };

        let job = Job {
            seq: self.next_seq,
            key,
        };

        #[cfg(feature = "tracing")]
        tracing::trace!("Submitting {:?} as seq {}", job.key, job.seq);

        // The coordinator must learn about the job before any worker can
        // report on it.
        event_slot.send(Event::Submitted(job.clone()));
        job_slot.send(job);
        self.next_seq += 1;
        Ok(())
    }

    /// Shuts the broker down and waits until every result has been released.
    ///
    /// Closes the job queue, waits for every in-flight predicate call to
    /// finish and every worker to exit, then lets the coordinator drain and
    /// check that nothing is left over before it closes the output stream.
    /// Calling it again after it has completed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the coordinator task was cancelled.
    ///
    /// # Panics
    ///
    /// - Re-raises a panic from the predicate on any worker.
    /// - Re-raises an [`InvariantViolation`](crate::InvariantViolation) from
    ///   the coordinator.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == BrokerState::Closed {
            return Ok(());
        }

        // === Phase 0: Stop accepting new jobs ===
        self.state = BrokerState::Draining;
        #[cfg(feature = "tracing")]
        tracing::debug!("Broker draining after {} submissions", self.next_seq);
        drop(self.jobs.take());

        // === Phase 1: Wait for in-flight predicate calls ===
        if let Some(pool) = self.pool.take() {
            pool.join().await;
        }

        // === Phase 2: Let the coordinator drain and verify ===
        if let Some(events) = self.events.take() {
            if let Err(_e) = events.send(Event::Shutdown).await {
                #[cfg(feature = "tracing")]
                tracing::warn!("Coordinator exited before shutdown: {_e}");
            }
        }
        if let Some(coordinator) = self.coordinator.take() {
            match coordinator.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    return Err(Error::ChannelError {
                        context: format!("coordinator task failed: {e}"),
                    });
                }
            }
        }

        self.state = BrokerState::Closed;
        #[cfg(feature = "tracing")]
        tracing::debug!("Broker closed");
        Ok(())
    }
}

fn worker_fault() -> Error {
    Error::ChannelError {
        context: "a predicate panicked on a worker; shutdown re-raises it".to_string(),
    }
}

impl<K> fmt::Debug for Broker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("state", &self.state)
            .field("submitted", &self.next_seq)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::from_fn;

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let err = Broker::<String>::new(0, from_fn(|_: String| async { true })).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn zero_output_buffer_is_rejected() {
        let config = BrokerConfig {
            concurrency: 2,
            output_buffer: 0,
        };
        let err = Broker::<u32>::with_config(config, from_fn(|_: u32| async { true })).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn results_can_only_be_taken_once() {
        let mut broker = Broker::<u32>::new(1, from_fn(|_: u32| async { true })).unwrap();
        assert!(broker.results().is_ok());
        assert_eq!(broker.results().unwrap_err(), Error::ResultsTaken);
        broker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn state_machine_moves_forward_only() {
        let mut broker = Broker::<u32>::new(2, from_fn(|_: u32| async { true })).unwrap();
        assert_eq!(broker.state(), BrokerState::Open);
        broker.shutdown().await.unwrap();
        assert_eq!(broker.state(), BrokerState::Closed);
        assert_eq!(broker.submit(1).await.unwrap_err(), Error::BrokerClosed);
        broker.shutdown().await.unwrap();
        assert_eq!(broker.state(), BrokerState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_fails_fast_after_a_predicate_panic() {
        let mut broker = Broker::<u32>::new(
            2,
            from_fn(|n: u32| async move {
                assert!(n != 0, "zero is not allowed");
                true
            }),
        )
        .unwrap();
        let _results = broker.results().unwrap();
        broker.submit(0).await.unwrap();
        broker.fault.cancelled().await;

        let err = broker.submit(1).await.unwrap_err();
        assert!(matches!(err, Error::ChannelError { .. }));
        assert_eq!(broker.submitted(), 1);
        assert_eq!(broker.state(), BrokerState::Open);
    }

    #[tokio::test]
    async fn submitted_counts_accepted_keys() {
        let mut broker = Broker::<u32>::new(4, from_fn(|_: u32| async { true })).unwrap();
        let results = broker.results().unwrap();
        let consumer = tokio::spawn(tokio_stream::StreamExt::collect::<Vec<_>>(results));
        for n in 0..3 {
            broker.submit(n).await.unwrap();
        }
        assert_eq!(broker.submitted(), 3);
        broker.shutdown().await.unwrap();
        assert_eq!(consumer.await.unwrap().len(), 3);
    }
}
