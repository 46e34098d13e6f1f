//! Extension composition: domain reducers run ahead of the base machine.
//!
//! A domain flow (skill retrieval, agent phases) extends the event
//! vocabulary without touching the base reducer. Registered handlers see
//! every event first, in registration order; the first to return `Some`
//! wins, and anything unclaimed falls through to
//! [`reduce`](crate::reducer::reduce).

use std::fmt;

use skein_types::StreamEvent;
use tracing::trace;

use crate::reducer;
use crate::state::TimelineState;

/// One pluggable event handler.
pub trait EventReducer: Send + Sync {
    /// Attempt to handle `event` against `state`.
    ///
    /// `None` means "not mine": the event falls through to the next handler
    /// and finally to the base reducer. `Some(next)` consumes the event,
    /// whether or not `next` differs from `state`.
    fn try_reduce(&self, state: &TimelineState, event: &StreamEvent) -> Option<TimelineState>;

    /// Handler name for logs.
    fn name(&self) -> &str {
        "handler"
    }
}

/// Ordered handler chain in front of the base reducer.
#[derive(Default)]
pub struct Composer {
    handlers: Vec<Box<dyn EventReducer>>,
}

impl Composer {
    /// Chain with no handlers; equivalent to the base reducer alone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Earlier registrations win when several claim the
    /// same event.
    pub fn with_handler(mut self, handler: Box<dyn EventReducer>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Append a handler in place.
    pub fn push(&mut self, handler: Box<dyn EventReducer>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Run one event through the chain, falling back to the base reducer.
    pub fn reduce(&self, state: TimelineState, event: &StreamEvent) -> TimelineState {
        for handler in &self.handlers {
            if let Some(next) = handler.try_reduce(&state, event) {
                trace!(
                    handler = handler.name(),
                    event_type = event.event_type(),
                    "extension handled event"
                );
                return next;
            }
        }
        reducer::reduce(state, event)
    }
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}
