use crate::{
    error::InvariantViolation,
    job::{Job, RawResult, Seq, Verdict},
};
use core::fmt;
use std::collections::{HashMap, VecDeque};

/// Reorder state owned exclusively by the coordinator task.
///
/// Holds the Submission Queue (jobs whose result has not been released, in
/// submission order) and the Result Buffer (results that arrived before their
/// job reached the front of the queue). Results are matched by sequence
/// number, so two occurrences of the same key are never confused with each
/// other.
///
/// Pending sequence numbers are always contiguous: the front of the queue is
/// `next_seq - pending.len()`.
pub struct ReorderBuffer<K> {
    pending: VecDeque<Job<K>>,
    arrived: HashMap<Seq, RawResult<K>>,
    next_seq: Seq,
}

impl<K> Default for ReorderBuffer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ReorderBuffer<K> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            arrived: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Number of submitted jobs whose result has not been released yet.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of results waiting for an earlier job to complete.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub fn buffered_len(&self) -> usize {
        self.arrived.len()
    }

    fn front_seq(&self) -> Seq {
        self.next_seq - self.pending.len() as Seq
    }
}

impl<K> ReorderBuffer<K>
where
    K: Eq + fmt::Debug,
{
    /// Appends a job to the tail of the Submission Queue.
    ///
    /// Jobs must arrive with consecutive sequence numbers.
    pub fn submit(&mut self, job: Job<K>) -> Result<(), InvariantViolation> {
        if job.seq != self.next_seq {
            return Err(InvariantViolation::new(format!(
                "submission {} arrived out of order (expected {})",
                job.seq, self.next_seq
            )));
        }
        self.next_seq += 1;
        self.pending.push_back(job);
        Ok(())
    }

    /// Stores a worker result until its job reaches the front of the queue.
    ///
    /// A result whose sequence number is not pending, or that was already
    /// received, means a result exists with no matching submission.
    pub fn accept(&mut self, result: RawResult<K>) -> Result<(), InvariantViolation> {
        if result.seq < self.front_seq() || result.seq >= self.next_seq {
            return Err(InvariantViolation::new(format!(
                "result for {:?} (seq {}) has no pending submission",
                result.key, result.seq
            )));
        }
        if self.arrived.contains_key(&result.seq) {
            return Err(InvariantViolation::new(format!(
                "duplicate result for {:?} (seq {})",
                result.key, result.seq
            )));
        }
        self.arrived.insert(result.seq, result);
        Ok(())
    }

    /// Releases the result for the front of the Submission Queue, if it has
    /// arrived.
    ///
    /// Call repeatedly until it returns `Ok(None)` to drain every result that
    /// is now in order.
    pub fn release(&mut self) -> Result<Option<Verdict<K>>, InvariantViolation> {
        let Some(front) = self.pending.front() else {
            return Ok(None);
        };
        let Some(result) = self.arrived.remove(&front.seq) else {
            return Ok(None);
        };
        if result.key != front.key {
            return Err(InvariantViolation::new(format!(
                "seq {} was submitted as {:?} but completed as {:?}",
                front.seq, front.key, result.key
            )));
        }
        self.pending.pop_front();
        Ok(Some(result.into_verdict()))
    }

    /// Checks the end-of-drain invariant: nothing pending, nothing buffered.
    pub fn finish(self) -> Result<(), InvariantViolation> {
        if !self.arrived.is_empty() {
            let mut orphans: Vec<_> = self.arrived.into_values().collect();
            orphans.sort_by_key(|r| r.seq);
            return Err(InvariantViolation::new(format!(
                "{} result(s) left unmatched at shutdown, first: {:?}",
                orphans.len(),
                orphans[0].key
            )));
        }
        if let Some(front) = self.pending.front() {
            return Err(InvariantViolation::new(format!(
                "{} submission(s) never completed, first: {:?} (seq {})",
                self.pending.len(),
                front.key,
                front.seq
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(seq: Seq, key: &'static str) -> Job<&'static str> {
        Job { seq, key }
    }

    fn raw(seq: Seq, key: &'static str, valid: bool) -> RawResult<&'static str> {
        RawResult { seq, key, valid }
    }

    fn drain(buf: &mut ReorderBuffer<&'static str>) -> Vec<(&'static str, bool)> {
        let mut out = Vec::new();
        while let Some(v) = buf.release().unwrap() {
            out.push((v.key, v.valid));
        }
        out
    }

    #[test]
    fn later_results_wait_for_the_front() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "b.com")).unwrap();
        buf.submit(job(1, "a.com")).unwrap();
        buf.submit(job(2, "c.com")).unwrap();

        buf.accept(raw(2, "c.com", true)).unwrap();
        assert!(drain(&mut buf).is_empty());
        buf.accept(raw(1, "a.com", false)).unwrap();
        assert!(drain(&mut buf).is_empty());
        assert_eq!(buf.buffered_len(), 2);

        buf.accept(raw(0, "b.com", true)).unwrap();
        assert_eq!(
            drain(&mut buf),
            vec![("b.com", true), ("a.com", false), ("c.com", true)]
        );
        assert_eq!(buf.pending_len(), 0);
        buf.finish().unwrap();
    }

    #[test]
    fn duplicate_keys_are_attributed_per_occurrence() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "dup.com")).unwrap();
        buf.submit(job(1, "dup.com")).unwrap();

        // The second occurrence finishes first with a different answer.
        buf.accept(raw(1, "dup.com", false)).unwrap();
        assert!(drain(&mut buf).is_empty());
        buf.accept(raw(0, "dup.com", true)).unwrap();

        assert_eq!(drain(&mut buf), vec![("dup.com", true), ("dup.com", false)]);
        buf.finish().unwrap();
    }

    #[test]
    fn result_without_submission_is_rejected() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "a.com")).unwrap();
        let err = buf.accept(raw(5, "ghost.com", true)).unwrap_err();
        assert!(err.detail.contains("ghost.com"));
    }

    #[test]
    fn already_released_seq_is_rejected() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "a.com")).unwrap();
        buf.accept(raw(0, "a.com", true)).unwrap();
        assert_eq!(drain(&mut buf).len(), 1);
        assert!(buf.accept(raw(0, "a.com", true)).is_err());
    }

    #[test]
    fn duplicate_result_is_rejected() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "a.com")).unwrap();
        buf.submit(job(1, "b.com")).unwrap();
        buf.accept(raw(1, "b.com", true)).unwrap();
        assert!(buf.accept(raw(1, "b.com", true)).is_err());
    }

    #[test]
    fn mismatched_key_is_rejected_on_release() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "a.com")).unwrap();
        buf.accept(raw(0, "z.com", true)).unwrap();
        let err = buf.release().unwrap_err();
        assert!(err.detail.contains("z.com"));
    }

    #[test]
    fn out_of_order_submission_is_rejected() {
        let mut buf = ReorderBuffer::new();
        assert!(buf.submit(job(1, "a.com")).is_err());
    }

    #[test]
    fn finish_reports_leftovers() {
        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "a.com")).unwrap();
        buf.submit(job(1, "b.com")).unwrap();
        buf.accept(raw(1, "b.com", true)).unwrap();
        let err = buf.finish().unwrap_err();
        assert!(err.detail.contains("unmatched"));

        let mut buf = ReorderBuffer::new();
        buf.submit(job(0, "a.com")).unwrap();
        let err = buf.finish().unwrap_err();
        assert!(err.detail.contains("never completed"));
    }

    #[test]
    fn empty_buffer_finishes_cleanly() {
        let buf: ReorderBuffer<&'static str> = ReorderBuffer::new();
        buf.finish().unwrap();
    }
}
