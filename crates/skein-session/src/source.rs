//! Transport seam: where stream envelopes come from.
//!
//! The session pulls; the transport produces. Anything that can yield
//! envelopes in order — an SSE connection, a websocket, a replay file —
//! implements [`EventSource`] and the session never knows the difference.

use std::collections::VecDeque;
use std::future::Future;

use skein_types::Envelope;

use crate::error::TransportError;

/// Pull-based source of envelopes for one turn's stream.
///
/// `None` is a clean end of stream. Implementations should be cancel-safe:
/// the session drops the in-flight future when the turn is aborted, and at
/// most the event being pulled may be lost.
pub trait EventSource: Send {
    /// Pull the next envelope, if any.
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Option<Result<Envelope, TransportError>>> + Send;
}

/// Canned event source for tests and replay.
///
/// Yields its script front to back, then ends the stream. An `Err` entry
/// reproduces a transport failure at that exact point.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Envelope, TransportError>>,
}

impl ScriptedSource {
    /// Source over a mixed script of envelopes and failures.
    pub fn new(script: impl IntoIterator<Item = Result<Envelope, TransportError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// All-success convenience.
    pub fn of(envelopes: impl IntoIterator<Item = Envelope>) -> Self {
        Self::new(envelopes.into_iter().map(Ok))
    }

    /// Append an envelope to the script.
    pub fn push(&mut self, envelope: Envelope) {
        self.script.push_back(Ok(envelope));
    }

    /// Append a failure to the script.
    pub fn push_error(&mut self, error: TransportError) {
        self.script.push_back(Err(error));
    }

    /// Entries not yet pulled.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl EventSource for ScriptedSource {
    async fn next_event(&mut self) -> Option<Result<Envelope, TransportError>> {
        self.script.pop_front()
    }
}
