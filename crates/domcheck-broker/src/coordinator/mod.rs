//! Order-restoring coordinator.
//!
//! A single task owns the [`ReorderBuffer`](reorder::ReorderBuffer) and is its only writer, so the
//! Submission Queue and the Result Buffer need no locking. Submission notices
//! and worker results reach it through one MPSC channel; released results
//! leave through the ordered output channel.
//!
//! ## Structure
//!
//! - [`reorder`] - the pure reorder state and its invariants.
//! - [`task`] - the event loop driving it.

pub mod reorder;
pub mod task;
