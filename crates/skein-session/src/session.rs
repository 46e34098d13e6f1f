//! The session controller: one timeline, one stream at a time.
//!
//! [`Session`] owns a [`TimelineState`] and a [`Composer`], and drives them
//! from an [`EventSource`]. All asynchrony lives here; the timeline crate
//! below stays pure. The send loop is the single writer: each envelope is
//! screened (conversation filter, sequence check), strictly decoded, then
//! folded through the composer before the next one is pulled.

use skein_timeline::{ActiveTurn, Composer, EventReducer, TimelineState};
use skein_types::{
    ConversationId, Envelope, HistoryRecord, ItemId, StreamEvent, TimelineItem, TurnId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{SessionError, TransportError};
use crate::source::EventSource;

/// How a send finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream closed the turn (or ran out of events).
    Completed {
        /// The turn's settled id: the backend's real id after `meta.start`,
        /// otherwise the provisional one.
        turn_id: TurnId,
    },
    /// The caller aborted; every item of the turn was purged.
    Aborted,
}

/// Cloneable handle that aborts the turn in flight.
///
/// Acquired from [`Session::abort_handle`] before the send starts, and
/// safe to fire from any task. Aborting while no turn is streaming does
/// nothing.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    /// Request a cooperative abort of the current turn.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Whether an abort has been requested on this handle's turn.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Builder for [`Session`]. The reducer chain order is the only real
/// tunable; everything else is plumbing.
#[derive(Debug, Default)]
pub struct SessionBuilder {
    composer: Composer,
    conversation_id: Option<ConversationId>,
    state: Option<TimelineState>,
}

impl SessionBuilder {
    /// Register an extension reducer. Registration order is evaluation
    /// order.
    pub fn with_reducer(mut self, reducer: Box<dyn EventReducer>) -> Self {
        self.composer.push(reducer);
        self
    }

    /// Pin the conversation id instead of adopting it from the first
    /// envelope.
    pub fn with_conversation_id(mut self, id: impl Into<ConversationId>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Start from an existing state snapshot instead of an empty timeline.
    pub fn with_state(mut self, state: TimelineState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Session {
        Session {
            state: self.state.unwrap_or_default(),
            composer: self.composer,
            abort: CancellationToken::new(),
            conversation_id: self.conversation_id,
            last_seq: 0,
            last_error: None,
        }
    }
}

/// Why the send loop stopped pulling.
enum StreamExit {
    /// An event closed the turn.
    Finished,
    /// The source ran out before anything closed the turn.
    Exhausted,
    /// The abort token fired between deliveries.
    Aborted,
    /// The transport failed.
    Failed(TransportError),
}

/// Owner of one conversation's timeline and its event stream.
#[derive(Debug)]
pub struct Session {
    state: TimelineState,
    composer: Composer,
    abort: CancellationToken,
    conversation_id: Option<ConversationId>,
    last_seq: u64,
    last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Session {
    /// Session with an empty timeline and the base reducer only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The current timeline. Cheap to clone; snapshots stay valid.
    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    /// The conversation this session is bound to, once known.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Highest sequence number seen on the current stream.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Sticky copy of the most recent transport failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a turn is streaming right now.
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    /// Handle that aborts the turn in flight. Acquire before the send and
    /// hand it to whatever owns the stop button.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            token: self.abort.clone(),
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Send a user message and consume the backend's event stream for the
    /// turn.
    ///
    /// Appends the user item (whose fresh id doubles as the provisional
    /// turn id) and the waiting placeholder, then pulls `source` to
    /// completion. Returns once the turn closes, the source ends, the
    /// abort handle fires, or the transport fails. On transport failure
    /// the applied state is kept; partial progress is informative.
    pub async fn send_message<S: EventSource>(
        &mut self,
        text: impl Into<String>,
        mut source: S,
    ) -> Result<SendOutcome, SessionError> {
        if self.state.is_streaming() {
            return Err(SessionError::Busy);
        }
        if self.abort.is_cancelled() {
            // A stale abort fired while idle must not cancel this turn.
            self.abort = CancellationToken::new();
        }
        let token = self.abort.clone();
        self.last_seq = 0;
        self.last_error = None;

        let user_id = ItemId::new();
        let provisional = TurnId::from(&user_id);
        debug!(turn = %provisional, "send: opening provisional turn");
        let mut state = std::mem::take(&mut self.state)
            .with_item(TimelineItem::user(user_id, provisional.clone(), text))
            .with_item(TimelineItem::waiting(provisional.clone()))
            .with_active_turn(Some(ActiveTurn::streaming(provisional.clone())));

        let exit = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    break StreamExit::Aborted;
                }
                pulled = source.next_event() => match pulled {
                    None => break StreamExit::Exhausted,
                    Some(Err(err)) => break StreamExit::Failed(err),
                    Some(Ok(envelope)) => {
                        if !self.track_envelope(&envelope) {
                            continue;
                        }
                        if let Some(event) = StreamEvent::decode(envelope) {
                            state = self.composer.reduce(state, &event);
                            if !state.is_streaming() {
                                break StreamExit::Finished;
                            }
                        }
                    }
                }
            }
        };

        match exit {
            StreamExit::Finished | StreamExit::Exhausted => {
                // A stream that ends without a final still leaves a closed,
                // renderable turn.
                state = state.map_active_turn(close_cursor);
                let turn_id = state.current_turn().cloned().unwrap_or(provisional);
                self.state = state;
                debug!(turn = %turn_id, items = self.state.len(), "turn complete");
                Ok(SendOutcome::Completed { turn_id })
            }
            StreamExit::Aborted => {
                let turn_id = state.current_turn().cloned().unwrap_or(provisional);
                self.state = state.without_turn(&turn_id);
                // The cancelled token is spent; arm a fresh one for the
                // next turn.
                self.abort = CancellationToken::new();
                debug!(turn = %turn_id, "turn aborted, items purged");
                Ok(SendOutcome::Aborted)
            }
            StreamExit::Failed(err) => {
                state = state.map_active_turn(close_cursor);
                self.state = state;
                self.last_error = Some(err.to_string());
                warn!(error = %err, "transport failure, keeping applied state");
                Err(SessionError::Transport(err))
            }
        }
    }

    /// Replace the timeline with one rebuilt from persisted records.
    pub fn load_history(&mut self, records: &[HistoryRecord]) -> Result<(), SessionError> {
        if self.state.is_streaming() {
            return Err(SessionError::HistoryWhileStreaming);
        }
        debug!(records = records.len(), "loading history");
        self.state = skein_timeline::rebuild(records);
        Ok(())
    }

    /// Drop everything: timeline, adopted conversation id, sequence and
    /// error bookkeeping.
    pub fn new_conversation(&mut self) -> Result<(), SessionError> {
        if self.state.is_streaming() {
            return Err(SessionError::Busy);
        }
        self.state = std::mem::take(&mut self.state).reset();
        self.conversation_id = None;
        self.last_seq = 0;
        self.last_error = None;
        debug!("new conversation");
        Ok(())
    }

    /// Screen an envelope before decode. Returns false for envelopes that
    /// belong to another conversation; adopts the conversation id from the
    /// first envelope that carries one.
    fn track_envelope(&mut self, envelope: &Envelope) -> bool {
        if !envelope.conversation_id.is_empty() {
            match &self.conversation_id {
                None => {
                    debug!(conversation = %envelope.conversation_id, "adopted conversation id");
                    self.conversation_id = Some(envelope.conversation_id.clone());
                }
                Some(current) if *current != envelope.conversation_id => {
                    trace!(
                        conversation = %envelope.conversation_id,
                        "event for another conversation, dropping"
                    );
                    return false;
                }
                Some(_) => {}
            }
        }
        if self.last_seq != 0 && envelope.seq <= self.last_seq {
            warn!(
                seq = envelope.seq,
                last_seq = self.last_seq,
                "event sequence regression"
            );
        } else {
            self.last_seq = envelope.seq;
        }
        true
    }
}

fn close_cursor(turn: &mut ActiveTurn) {
    turn.is_streaming = false;
    turn.current_model_call = None;
    turn.current_tool_call = None;
}
