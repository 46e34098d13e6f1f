//! Pure timeline state machine for streamed conversations.
//!
//! Everything in this crate is a total function over values: no I/O, no
//! channels, no globals. The session layer owns transports and tasks; this
//! crate owns what a stream of events *means*.
//!
//! ```text
//! Envelope ──StreamEvent::decode──▶ StreamEvent ──Composer::reduce──▶ TimelineState
//!                                                  ├─ EventReducer handlers
//!                                                  └─ base reduce()
//! ```
//!
//! # Design
//!
//! - **Persistent state value.** [`TimelineState`] mutations consume `self`
//!   and return the next state. A snapshot handed to a renderer stays valid
//!   forever; there is nothing to lock.
//! - **One strict boundary.** Payload validation happens in
//!   `StreamEvent::decode` (skein-types). Reducers trust decoded shapes and
//!   only defend against *sequencing* surprises: unknown ids, deltas with
//!   no open cluster, events for turns already purged.
//! - **Extension by composition.** Domain flows add vocabulary by
//!   implementing [`EventReducer`] and registering with [`Composer`], never
//!   by editing the base machine. [`SkillFlowReducer`] is the built-in
//!   example: the skill-retrieval events a skill-augmented backend emits.
//! - **History is replay-free.** [`rebuild`] maps persisted records
//!   straight onto closed items; the reducers never see them.

mod aggregate;
mod compose;
mod history;
mod reducer;
mod skills;
mod state;

pub use compose::{Composer, EventReducer};
pub use history::rebuild;
pub use reducer::reduce;
pub use skills::SkillFlowReducer;
pub use state::{ActiveTurn, TimelineState};
