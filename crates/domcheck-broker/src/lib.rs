#![doc = include_str!("../README.md")]

mod broker;
mod coordinator;
mod error;
mod job;
mod pool;
mod predicate;

pub use broker::{Broker, BrokerConfig, BrokerState, ResultStream};
pub use error::{Error, InvariantViolation, Result};
pub use job::{Seq, Verdict};
pub use predicate::{BlockingPredicate, FnPredicate, Predicate, from_blocking_fn, from_fn};
