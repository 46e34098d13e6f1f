//! Error types for the session layer.
//!
//! Malformed events are not errors; the decode boundary drops them. Only
//! transport failure and caller mistakes surface here.

use thiserror::Error;

/// Failure reported by an [`EventSource`](crate::EventSource) while pulling
/// events.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying connection dropped mid-stream.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The peer sent something the transport layer could not frame.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Session-level failures surfaced to callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A turn is already streaming on this timeline. One stream per
    /// session; queueing is the caller's business.
    #[error("a turn is already streaming")]
    Busy,
    /// The event source failed mid-stream. Applied state is kept as-is;
    /// see `Session::last_error` for the sticky copy.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// History can only replace a quiescent timeline.
    #[error("cannot load history while a turn is streaming")]
    HistoryWhileStreaming,
}
