//! Typed identifiers for timeline items, sub-items, turns, and conversations.
//!
//! All ID types wrap an opaque `String`. Backend-minted identifiers arrive on
//! the wire in whatever shape the backend chose (hex UUIDs today) and must
//! round-trip byte-identical, so the payload is a string rather than a parsed
//! `Uuid`. Fresh client-side ids are minted as UUIDv7 simple hex (time-ordered,
//! 32 chars) via [`new()`](ItemId::new). The `short()` form (first 8 chars) is
//! for human-facing display only — never a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A timeline item identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// A sub-item identifier (fragment inside a model-call cluster).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubItemId(String);

/// A turn identifier — groups the items of one conversational exchange.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

/// A conversation identifier (assigned by the backend).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_wire_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a fresh client-side ID (UUIDv7 simple hex, time-ordered).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7().as_simple().to_string())
            }

            /// The raw string form, exactly as it appeared on the wire.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters — for human display only, not lookup.
            ///
            /// Falls back to the full id when it is shorter than 8 chars or
            /// an 8-byte cut would split a multi-byte character.
            pub fn short(&self) -> &str {
                self.0.get(..8).unwrap_or(&self.0)
            }

            /// Whether the underlying string is empty.
            ///
            /// Empty ids never occur in well-formed streams; the decode layer
            /// uses this to reject envelopes with blank required identifiers.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<$T> for String {
            fn from(id: $T) -> String {
                id.0
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full id for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_wire_id!(ItemId, "ItemId");
impl_wire_id!(SubItemId, "SubItemId");
impl_wire_id!(TurnId, "TurnId");
impl_wire_id!(ConversationId, "ConversationId");

// ── Derived ids ─────────────────────────────────────────────────────────────

impl ItemId {
    /// The waiting-placeholder id for a turn.
    ///
    /// The placeholder's own id embeds the turn id, so renaming a turn
    /// (provisional → backend-assigned) also rewrites this id. That is the
    /// single sanctioned id rewrite in the model.
    pub fn waiting_for(turn: &TurnId) -> Self {
        Self(format!("waiting-{}", turn.as_str()))
    }
}

impl SubItemId {
    /// A cluster-child id: `"{cluster}-{tag}-{ordinal}"`.
    ///
    /// Deterministic per (cluster, tag, ordinal) so replays address the same
    /// fragment without coordination.
    pub fn child_of(cluster: &ItemId, tag: &str, ordinal: usize) -> Self {
        Self(format!("{}-{}-{}", cluster.as_str(), tag, ordinal))
    }
}

impl From<&ItemId> for TurnId {
    /// A fresh user-message id doubles as the provisional turn id until the
    /// backend assigns the real one.
    fn from(id: &ItemId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl From<&TurnId> for ItemId {
    fn from(id: &TurnId) -> Self {
        Self(id.as_str().to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
