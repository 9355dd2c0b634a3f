//! Fixed-size pool of validation workers.
//!
//! ## Structure
//!
//! - [`manager`] - spawning and joining the workers ([`WorkerPool`]).
//! - [`worker`] - the per-worker receive / check / report loop.

pub mod manager;
pub mod worker;

pub use manager::WorkerPool;
