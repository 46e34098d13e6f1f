//! Persisted conversation records — the input to history replay.
//!
//! History replay never goes through the live reducer: stored exchanges have
//! no streaming state to reconstruct, so the rebuild path consumes these
//! records directly.

use serde::{Deserialize, Serialize};

use crate::ids::ItemId;
use crate::item::Role;

/// One persisted message, as the backend stores it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: ItemId,
    pub role: Role,
    pub content: String,
    /// Model latency captured at save time (assistant records only); becomes
    /// the replayed cluster's `elapsed_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl HistoryRecord {
    /// Build a record.
    pub fn new(id: impl Into<ItemId>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            latency_ms: None,
        }
    }

    /// Attach the saved model latency.
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
