//! Async turn controller for Skein timelines.
//!
//! Sits between a transport and the pure [`skein_timeline`] reducer:
//!
//! ```text
//!   transport ──► EventSource ──► Session::send_message ──► TimelineState
//!                                   │ screen (conversation, seq)
//!                                   │ StreamEvent::decode
//!                                   └ Composer::reduce
//! ```
//!
//! [`Session`] is the single writer of its timeline. One turn streams at a
//! time; a second send while streaming is rejected with
//! [`SessionError::Busy`] rather than interleaved. Aborts are cooperative:
//! an [`AbortHandle`] cancels between event deliveries, never mid-fold.

mod error;
mod session;
mod source;

pub use error::{SessionError, TransportError};
pub use session::{AbortHandle, SendOutcome, Session, SessionBuilder};
pub use source::{EventSource, ScriptedSource};

pub use skein_timeline::{Composer, EventReducer, SkillFlowReducer, TimelineState};
