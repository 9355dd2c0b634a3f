use super::reorder::ReorderBuffer;
use crate::{
    error::InvariantViolation,
    job::{Event, Verdict},
};
use core::fmt;
use tokio::sync::mpsc;

/// Coordinator task responsible for restoring submission order.
///
/// Receives [`Event`]s until [`Event::Shutdown`] arrives or every sender is
/// gone. After each completed result it releases as many in-order results as
/// possible onto `output`.
///
/// # Behavior
///
/// - On `Shutdown` the drain invariant is checked and the output channel is
///   closed by dropping `output`.
/// - If the consumer drops the output stream, results keep being matched and
///   are discarded so the invariants still hold at shutdown.
/// - If the event channel closes without `Shutdown` (the broker was dropped),
///   the task exits without checking the drain invariant.
///
/// # Panics
///
/// Panics with an [`InvariantViolation`] payload when the reorder state is
/// inconsistent.
pub async fn coordinator_loop<K>(
    mut events: mpsc::Receiver<Event<K>>,
    output: mpsc::Sender<Verdict<K>>,
) where
    K: Eq + fmt::Debug + Send,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Coordinator started");

    let mut buffer = ReorderBuffer::new();
    let mut output = Some(output);

    while let Some(event) = events.recv().await {
        let step = match event {
            Event::Submitted(job) => buffer.submit(job),
            Event::Completed(result) => match buffer.accept(result) {
                Ok(()) => release_ready(&mut buffer, &mut output).await,
                Err(violation) => Err(violation),
            },
            Event::Shutdown => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Coordinator received shutdown signal ({} pending, {} buffered)",
                    buffer.pending_len(),
                    buffer.buffered_len()
                );

                if let Err(violation) = buffer.finish() {
                    fail(violation);
                }

                #[cfg(feature = "tracing")]
                tracing::trace!("Coordinator drained, closing output");
                return;
            }
        };

        if let Err(violation) = step {
            fail(violation);
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Broker dropped before shutdown, abandoning {} pending result(s)",
        buffer.pending_len()
    );
}

async fn release_ready<K>(
    buffer: &mut ReorderBuffer<K>,
    output: &mut Option<mpsc::Sender<Verdict<K>>>,
) -> Result<(), InvariantViolation>
where
    K: Eq + fmt::Debug,
{
    while let Some(verdict) = buffer.release()? {
        let Some(tx) = output.as_ref() else {
            continue;
        };
        if let Err(_e) = tx.send(verdict).await {
            #[cfg(feature = "tracing")]
            tracing::debug!("Result stream dropped, discarding further results: {_e}");
            *output = None;
        }
    }
    Ok(())
}

fn fail(violation: InvariantViolation) -> ! {
    #[cfg(feature = "tracing")]
    tracing::error!("{violation}");
    std::panic::panic_any(violation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, RawResult};

    #[tokio::test]
    async fn releases_in_submission_order_and_closes_on_shutdown() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = tokio::spawn(coordinator_loop(events_rx, out_tx));

        for (seq, key) in ["x", "y"].into_iter().enumerate() {
            events_tx
                .send(Event::Submitted(Job {
                    seq: seq as u64,
                    key,
                }))
                .await
                .unwrap();
        }
        events_tx
            .send(Event::Completed(RawResult {
                seq: 1,
                key: "y",
                valid: false,
            }))
            .await
            .unwrap();
        events_tx
            .send(Event::Completed(RawResult {
                seq: 0,
                key: "x",
                valid: true,
            }))
            .await
            .unwrap();
        events_tx.send(Event::Shutdown).await.unwrap();

        handle.await.unwrap();
        assert_eq!(out_rx.recv().await, Some(Verdict { key: "x", valid: true }));
        assert_eq!(out_rx.recv().await, Some(Verdict { key: "y", valid: false }));
        assert_eq!(out_rx.recv().await, None);
    }

    #[tokio::test]
    async fn orphan_result_panics_with_invariant_violation() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (out_tx, _out_rx) = mpsc::channel(8);
        let handle = tokio::spawn(coordinator_loop(events_rx, out_tx));

        events_tx
            .send(Event::Completed(RawResult {
                seq: 0,
                key: "ghost",
                valid: true,
            }))
            .await
            .unwrap();

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        let payload = err.into_panic();
        let violation = payload.downcast_ref::<InvariantViolation>().unwrap();
        assert!(violation.detail.contains("ghost"));
    }

    #[tokio::test]
    async fn unfinished_submission_panics_at_shutdown() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (out_tx, _out_rx) = mpsc::channel(8);
        let handle = tokio::spawn(coordinator_loop(events_rx, out_tx));

        events_tx
            .send(Event::Submitted(Job { seq: 0, key: "a" }))
            .await
            .unwrap();
        events_tx.send(Event::Shutdown).await.unwrap();

        let err = handle.await.unwrap_err();
        assert!(err.into_panic().downcast_ref::<InvariantViolation>().is_some());
    }

    #[tokio::test]
    async fn dropped_senders_exit_quietly() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = tokio::spawn(coordinator_loop(events_rx, out_tx));

        events_tx
            .send(Event::Submitted(Job { seq: 0, key: "a" }))
            .await
            .unwrap();
        drop(events_tx);

        handle.await.unwrap();
        assert_eq!(out_rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_output_keeps_matching() {
        let (events_tx, events_rx) = mpsc::channel(8);
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);
        let handle = tokio::spawn(coordinator_loop(events_rx, out_tx));

        for seq in 0..3 {
            events_tx
                .send(Event::Submitted(Job { seq, key: seq }))
                .await
                .unwrap();
        }
        for seq in (0..3).rev() {
            events_tx
                .send(Event::Completed(RawResult {
                    seq,
                    key: seq,
                    valid: true,
                }))
                .await
                .unwrap();
        }
        events_tx.send(Event::Shutdown).await.unwrap();

        handle.await.unwrap();
    }
}
