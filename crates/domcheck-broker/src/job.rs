//! Messages exchanged between the broker facade, the workers and the
//! coordinator.
//!
//! - [`Job`]: one submitted key, tagged with its submission sequence number.
//! - [`RawResult`]: a worker's answer for one [`Job`], in completion order.
//! - [`Verdict`]: a result as released to the caller, in submission order.

/// Position of a [`Job`] in submission order. Starts at zero and increases by
/// one for every accepted `submit`.
pub type Seq = u64;

/// A key submitted for validation.
///
/// Duplicated keys are legal; each occurrence gets its own [`Seq`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job<K> {
    pub seq: Seq,
    pub key: K,
}

/// A worker's result for one [`Job`].
///
/// Carries the job's sequence number so the coordinator can attribute the
/// result to the exact occurrence that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResult<K> {
    pub seq: Seq,
    pub key: K,
    pub valid: bool,
}

impl<K> RawResult<K> {
    pub(crate) fn into_verdict(self) -> Verdict<K> {
        Verdict {
            key: self.key,
            valid: self.valid,
        }
    }
}

/// A `(key, result)` pair released on the ordered output stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Verdict<K> {
    pub key: K,
    pub valid: bool,
}

/// Events consumed by the coordinator task.
///
/// Submission notices and worker results travel through the same channel.
/// A `Submitted` notice is always enqueued before its job reaches a worker, so
/// the coordinator sees it before the matching `Completed`.
#[derive(Debug)]
pub(crate) enum Event<K> {
    Submitted(Job<K>),
    Completed(RawResult<K>),
    /// Sent by `Broker::shutdown` once every worker has exited.
    Shutdown,
}
