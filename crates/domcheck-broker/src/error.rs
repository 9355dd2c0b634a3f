//! Error types for the validation broker.
//!
//! This module defines the central [`Error`] enum, which captures every
//! recoverable and reportable failure a caller of the broker can observe, and
//! the separate [`InvariantViolation`] fault, which is never returned as a
//! value: it is raised as a panic payload because it means the ordering
//! guarantee has already been broken.
//!
//! ## Error Cases
//! - `InvalidConfig`: The broker was constructed with unusable settings.
//! - `BrokerClosed`: `submit` was called after shutdown had begun.
//! - `ResultsTaken`: The ordered output stream was requested twice.
//! - `ChannelError`: An internal communication failure between tasks.

use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the validation broker.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The configuration cannot produce a working broker.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The broker no longer accepts submissions.
    #[error("Broker closed: no submissions accepted after shutdown has begun")]
    BrokerClosed,

    /// The ordered output stream was already handed out.
    #[error("Result stream already taken")]
    ResultsTaken,

    /// Internal channel send/receive failure (e.g. every worker has died).
    #[error("Channel error: {context}")]
    ChannelError { context: String },
}

/// Internal-consistency failure of the order-restoring coordinator.
///
/// Raised with [`std::panic::panic_any`] on the coordinator task and re-raised
/// from [`Broker::shutdown`](crate::Broker::shutdown). Callers that want to
/// tell it apart from other panics can downcast the payload:
///
/// ```ignore
/// let payload = std::panic::catch_unwind(|| ...).unwrap_err();
/// assert!(payload.downcast_ref::<InvariantViolation>().is_some());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub detail: String,
}

impl InvariantViolation {
    pub(crate) fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker invariant violation: {}", self.detail)
    }
}

impl core::error::Error for InvariantViolation {}
