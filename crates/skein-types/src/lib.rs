//! Shared identifiers, timeline items, and the wire event contract for skein.
//!
//! This crate is the relational foundation: typed ids, the timeline item
//! union, the event envelope with its strict per-type decode, and history
//! records. It has **no internal skein dependencies** — a pure leaf crate
//! that the reducer and session crates build on.
//!
//! # Entity Overview
//!
//! ```text
//! Conversation (ConversationId)
//!     └── contains Turn (TurnId) ← one user message + full assistant response
//!             └── groups TimelineItem (ItemId)
//!                     └── ModelCall cluster owns SubItem (SubItemId)
//!
//! Envelope (wire) ──strict decode──▶ StreamEvent ──▶ reducer (skein-timeline)
//! HistoryRecord (persisted) ────────────────────────▶ replay  (skein-timeline)
//! ```
//!
//! # Key Types
//!
//! |-------------------|---------------------------------------------------|
//! | Type              | Purpose                                           |
//! |-------------------|---------------------------------------------------|
//! | [`TimelineItem`]  | One renderable entry (id + turn + payload union)  |
//! | [`ItemPayload`]   | Closed tagged union of item kinds                 |
//! | [`ModelCallItem`] | Cluster of streamed fragments for one model call  |
//! | [`SubItem`]       | Fragment (reasoning / content / search results)   |
//! | [`ToolCallItem`]  | One tool invocation's lifecycle                   |
//! | [`CallStatus`]    | running / success / error / empty                 |
//! | [`Envelope`]      | Raw wire event (seq + type + ids + payload)       |
//! | [`StreamEvent`]   | Strictly decoded event the reducer dispatches on  |
//! | [`HistoryRecord`] | Persisted message for replay                      |
//! |-------------------|---------------------------------------------------|

pub mod event;
pub mod history;
pub mod ids;
pub mod item;

// Re-export primary types at crate root for convenience.
pub use event::{
    AssistantFinal, Delta, Envelope, ErrorSignal, MetaStart, ModelCallEnd, ModelCallStart,
    SkillActivated, StreamEvent, ToolEnd, ToolStart,
};
pub use history::HistoryRecord;
pub use ids::{ConversationId, ItemId, SubItemId, TurnId};
pub use item::{
    CallStatus, ItemPayload, ModelCallItem, Role, SkillHit, SkillTrigger, SkillTriggerKind,
    SubItem, TimelineItem, ToolCallItem,
};

/// Current time as Unix milliseconds. Used by constructors throughout the crate.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
