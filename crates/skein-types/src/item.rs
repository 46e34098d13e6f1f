//! Timeline items: the tagged union the rendering layer consumes.
//!
//! An item is `{ id, turn_id, ts }` plus a closed payload union discriminated
//! by `type`. Two payloads are composite: the model-call cluster owns an
//! ordered list of [`SubItem`] fragments (reasoning before content, at most
//! one fragment open), and the tool call tracks one invocation's lifecycle.
//!
//! ## Design: items are data, rules live elsewhere
//!
//! This module provides the shapes plus mechanical helpers (push a child,
//! keep the child index honest, flip a status once). The aggregation and
//! dispatch *rules* — what a delta does, when a placeholder dies — belong to
//! the reducer crate, which drives these types.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{ItemId, SubItemId, TurnId};
use crate::now_millis;

/// Lifecycle status for model-call clusters and tool calls.
///
/// Created `Running`; flips to a terminal state exactly once. `Empty` is the
/// terminal state for a cluster closed without error and without children —
/// rare, but renderable, never a crash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum CallStatus {
    /// In progress (streaming or executing).
    #[default]
    #[strum(serialize = "running", serialize = "active")]
    Running,
    /// Completed successfully.
    #[strum(serialize = "success", serialize = "done", serialize = "ok")]
    Success,
    /// Failed with a reported error.
    #[strum(serialize = "error", serialize = "failed", serialize = "not_found")]
    Error,
    /// Closed without error and without producing any output.
    Empty,
}

impl CallStatus {
    /// Parse from string (case-insensitive, with aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Running => "running",
            CallStatus::Success => "success",
            CallStatus::Error => "error",
            CallStatus::Empty => "empty",
        }
    }

    /// Check if this status is terminal (anything but `Running`).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallStatus::Running)
    }

    /// Check if this status indicates active work.
    pub fn is_running(&self) -> bool {
        matches!(self, CallStatus::Running)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of a history record author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Role {
    /// User (person at keyboard).
    #[default]
    #[strum(serialize = "user", serialize = "human")]
    User,
    /// Assistant (the model side of the exchange).
    #[strum(serialize = "assistant", serialize = "model", serialize = "agent")]
    Assistant,
    /// System message — skipped by history replay, kept for completeness.
    System,
}

impl Role {
    /// Parse from string (case-insensitive, with aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a skill activation was triggered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum SkillTriggerKind {
    /// Matched one of the skill's trigger keywords.
    Keyword,
    /// Matched the extracted intent of the query.
    Intent,
}

impl SkillTriggerKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillTriggerKind::Keyword => "keyword",
            SkillTriggerKind::Intent => "intent",
        }
    }
}

/// Why a skill activated: trigger kind plus the matched keyword, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTrigger {
    #[serde(rename = "trigger_type")]
    pub kind: SkillTriggerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_keyword: Option<String>,
}

impl SkillTrigger {
    /// Keyword-matched trigger.
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            kind: SkillTriggerKind::Keyword,
            trigger_keyword: Some(keyword.into()),
        }
    }

    /// Intent-detected trigger; no single keyword to show.
    pub fn intent() -> Self {
        Self {
            kind: SkillTriggerKind::Intent,
            trigger_keyword: None,
        }
    }
}

/// One retrieval hit from the skill search, rendered inline in a cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

// ── Sub-items ───────────────────────────────────────────────────────────────

/// A fragment inside a model-call cluster — the unit that receives deltas.
///
/// Reasoning and content stream text; search results arrive whole and are
/// never open. The aggregation rules (reasoning precedes content, one open
/// fragment at a time) are enforced by the reducer, not here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubItem {
    /// Intermediate "thinking" text.
    Reasoning {
        id: SubItemId,
        text: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_open: bool,
    },
    /// User-facing answer text.
    Content {
        id: SubItemId,
        text: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_open: bool,
    },
    /// Inline retrieval results (produced by the skill-flow reducer only).
    SearchResults { id: SubItemId, hits: Vec<SkillHit> },
}

/// Helper for `#[serde(skip_serializing_if)]` on bool fields.
fn is_false(v: &bool) -> bool {
    !v
}

impl SubItem {
    /// Open a new reasoning fragment seeded with the first delta.
    pub fn open_reasoning(cluster: &ItemId, ordinal: usize, delta: impl Into<String>) -> Self {
        SubItem::Reasoning {
            id: SubItemId::child_of(cluster, "reasoning", ordinal),
            text: delta.into(),
            is_open: true,
        }
    }

    /// Open a new content fragment seeded with the first delta.
    pub fn open_content(cluster: &ItemId, ordinal: usize, delta: impl Into<String>) -> Self {
        SubItem::Content {
            id: SubItemId::child_of(cluster, "content", ordinal),
            text: delta.into(),
            is_open: true,
        }
    }

    /// A closed content fragment carrying full text (history replay).
    pub fn closed_content(cluster: &ItemId, ordinal: usize, text: impl Into<String>) -> Self {
        SubItem::Content {
            id: SubItemId::child_of(cluster, "content", ordinal),
            text: text.into(),
            is_open: false,
        }
    }

    /// An inline search-results fragment (always closed).
    pub fn search_results(cluster: &ItemId, ordinal: usize, hits: Vec<SkillHit>) -> Self {
        SubItem::SearchResults {
            id: SubItemId::child_of(cluster, "search", ordinal),
            hits,
        }
    }

    /// The fragment's id.
    pub fn id(&self) -> &SubItemId {
        match self {
            SubItem::Reasoning { id, .. }
            | SubItem::Content { id, .. }
            | SubItem::SearchResults { id, .. } => id,
        }
    }

    /// Whether this fragment is still accepting deltas.
    pub fn is_open(&self) -> bool {
        match self {
            SubItem::Reasoning { is_open, .. } | SubItem::Content { is_open, .. } => *is_open,
            SubItem::SearchResults { .. } => false,
        }
    }

    /// Whether this is a reasoning fragment.
    pub fn is_reasoning(&self) -> bool {
        matches!(self, SubItem::Reasoning { .. })
    }

    /// Whether this is a content fragment.
    pub fn is_content(&self) -> bool {
        matches!(self, SubItem::Content { .. })
    }

    /// Streamed text, if this fragment kind carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            SubItem::Reasoning { text, .. } | SubItem::Content { text, .. } => Some(text),
            SubItem::SearchResults { .. } => None,
        }
    }

    /// Append a delta to the fragment's text. No-op for search results.
    pub fn push_text(&mut self, delta: &str) {
        match self {
            SubItem::Reasoning { text, .. } | SubItem::Content { text, .. } => {
                text.push_str(delta)
            }
            SubItem::SearchResults { .. } => {}
        }
    }

    /// Mark the fragment closed (`is_open = false`).
    pub fn close(&mut self) {
        match self {
            SubItem::Reasoning { is_open, .. } | SubItem::Content { is_open, .. } => {
                *is_open = false
            }
            SubItem::SearchResults { .. } => {}
        }
    }
}

// ── Model-call cluster ──────────────────────────────────────────────────────

/// The composite payload for one model invocation's streamed output.
///
/// Children are ordered (render order) and indexed by id; `child_index`
/// mirrors the timeline's own indexing invariant one level down:
/// `child_index[id] == i` ⟺ `children[i].id() == id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCallItem {
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SubItem>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub child_index: HashMap<SubItemId, usize>,
    /// Local receipt timestamp of the start event (Unix millis).
    pub started_at: u64,
    /// Locally computed `close − started_at`. Authoritative for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Backend-reported elapsed, kept verbatim; may be skewed by transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_elapsed_ms: Option<u64>,
    /// Prompt size reported by the start event, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelCallItem {
    /// A fresh cluster: `Running`, no children, clock started.
    pub fn running(message_count: Option<u32>) -> Self {
        Self {
            status: CallStatus::Running,
            children: Vec::new(),
            child_index: HashMap::new(),
            started_at: now_millis(),
            elapsed_ms: None,
            reported_elapsed_ms: None,
            message_count,
            error: None,
        }
    }

    /// An already-closed successful cluster (history replay).
    pub fn closed_success(children: Vec<SubItem>, elapsed_ms: Option<u64>) -> Self {
        let child_index = children
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id().clone(), i))
            .collect();
        Self {
            status: CallStatus::Success,
            children,
            child_index,
            started_at: now_millis(),
            elapsed_ms,
            reported_elapsed_ms: None,
            message_count: None,
            error: None,
        }
    }

    /// Append a child fragment, keeping the index honest.
    ///
    /// A duplicate child id is ignored (the index would otherwise lie about
    /// positions); callers derive ordinals from `children.len()`, so this
    /// only fires on misuse.
    pub fn push_child(&mut self, child: SubItem) {
        if self.child_index.contains_key(child.id()) {
            tracing::warn!(child = %child.id(), "duplicate cluster child id, ignoring");
            return;
        }
        self.child_index.insert(child.id().clone(), self.children.len());
        self.children.push(child);
    }

    /// Look up a child by id in O(1).
    pub fn child(&self, id: &SubItemId) -> Option<&SubItem> {
        self.child_index.get(id).and_then(|&i| self.children.get(i))
    }

    /// The currently open fragment, if any.
    pub fn open_child_mut(&mut self) -> Option<&mut SubItem> {
        self.children.iter_mut().find(|c| c.is_open())
    }

    /// Close every open fragment. Covers clusters whose end event never
    /// arrived when the turn closes.
    pub fn close_open_children(&mut self) {
        for child in &mut self.children {
            if child.is_open() {
                child.close();
            }
        }
    }

    /// Whether any content fragment has started in this cluster.
    pub fn has_content(&self) -> bool {
        self.children.iter().any(|c| c.is_content())
    }

    /// Flip the status once at call end and stamp the elapsed figures.
    ///
    /// Closing also closes any still-open fragment: call end terminates
    /// streaming for this cluster. Error payload present → `Error`;
    /// otherwise `Success`, or `Empty` when the cluster closes with zero
    /// children.
    pub fn close(&mut self, error: Option<String>, reported_elapsed_ms: Option<u64>) {
        if self.status.is_terminal() {
            tracing::warn!(status = %self.status, "cluster already closed, ignoring");
            return;
        }
        self.close_open_children();
        self.elapsed_ms = Some(now_millis().saturating_sub(self.started_at));
        self.reported_elapsed_ms = reported_elapsed_ms;
        self.status = match (&error, self.children.is_empty()) {
            (Some(_), _) => CallStatus::Error,
            (None, true) => CallStatus::Empty,
            (None, false) => CallStatus::Success,
        };
        self.error = error;
    }
}

// ── Tool call ───────────────────────────────────────────────────────────────

/// One tool invocation's lifecycle: started, then closed with a result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallItem {
    pub name: String,
    pub status: CallStatus,
    /// Local receipt timestamp of the start event (Unix millis).
    pub started_at: u64,
    /// Locally computed `close − started_at`; backend figures are not trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    /// Result preview in whatever shape the tool sent (string, list, object).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Result-row count reported by the end event (e.g. search hits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallItem {
    /// A fresh tool call: `Running`, clock started.
    pub fn running(name: impl Into<String>, input: Option<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            status: CallStatus::Running,
            started_at: now_millis(),
            elapsed_ms: None,
            input,
            output: None,
            count: None,
            error: None,
        }
    }

    /// Close the call, computing elapsed locally from `started_at`.
    ///
    /// Status resolution: an explicit error payload wins; else a reported
    /// terminal status wins; a missing or non-terminal report closes as
    /// `Success`. The resulting status is always terminal.
    pub fn close(
        &mut self,
        status: Option<CallStatus>,
        output: Option<serde_json::Value>,
        count: Option<u32>,
        error: Option<String>,
    ) {
        if self.status.is_terminal() {
            tracing::warn!(tool = %self.name, "tool call already closed, ignoring");
            return;
        }
        self.elapsed_ms = Some(now_millis().saturating_sub(self.started_at));
        self.status = match (&error, status) {
            (Some(_), _) => CallStatus::Error,
            (None, Some(s)) if s.is_terminal() => s,
            (None, _) => CallStatus::Success,
        };
        self.output = output;
        self.count = count;
        self.error = error;
    }
}

// ── Timeline item ───────────────────────────────────────────────────────────

/// Payload union for timeline items, discriminated by `type` on the wire.
///
/// `Extension` is the open end: domain reducers park their marker payloads
/// there, and renderers ignore kinds they do not know.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemPayload {
    /// A user message.
    User { content: String },
    /// A model-call cluster (streamed reasoning/content fragments).
    ModelCall(ModelCallItem),
    /// A tool invocation.
    ToolCall(ToolCallItem),
    /// A standalone error surfaced to the user.
    Error { message: String },
    /// Terminal marker for a turn, optionally carrying the canonical answer.
    Final {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// Informational marker: a skill activated for this turn.
    SkillActivated {
        skill_id: String,
        skill_name: String,
        #[serde(flatten)]
        trigger: SkillTrigger,
    },
    /// Synthetic placeholder between turn start and the first real item.
    Waiting {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// Open extension point for domain events.
    Extension { kind: String, data: serde_json::Value },
}

impl ItemPayload {
    /// The wire discriminant, for logging and render dispatch.
    pub fn kind_str(&self) -> &'static str {
        match self {
            ItemPayload::User { .. } => "user",
            ItemPayload::ModelCall(_) => "model_call",
            ItemPayload::ToolCall(_) => "tool_call",
            ItemPayload::Error { .. } => "error",
            ItemPayload::Final { .. } => "final",
            ItemPayload::SkillActivated { .. } => "skill_activated",
            ItemPayload::Waiting { .. } => "waiting",
            ItemPayload::Extension { .. } => "extension",
        }
    }
}

/// One entry in the timeline. Insertion order is render order.
///
/// `id` is immutable after creation with a single sanctioned exception: the
/// waiting placeholder's id embeds the turn id and is rewritten when a
/// provisional turn is renamed to its backend-assigned id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: ItemId,
    pub turn_id: TurnId,
    /// Creation timestamp (Unix millis, local clock).
    pub ts: u64,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

impl TimelineItem {
    fn new(id: ItemId, turn_id: TurnId, payload: ItemPayload) -> Self {
        Self { id, turn_id, ts: now_millis(), payload }
    }

    /// A user message. The caller supplies the id; on a fresh send it doubles
    /// as the provisional turn id.
    pub fn user(id: ItemId, turn_id: TurnId, content: impl Into<String>) -> Self {
        Self::new(id, turn_id, ItemPayload::User { content: content.into() })
    }

    /// A running model-call cluster. The item id is the backend's call id.
    pub fn model_call(id: ItemId, turn_id: TurnId, call: ModelCallItem) -> Self {
        Self::new(id, turn_id, ItemPayload::ModelCall(call))
    }

    /// A running tool call. The item id is the backend's tool-call id.
    pub fn tool_call(id: ItemId, turn_id: TurnId, tool: ToolCallItem) -> Self {
        Self::new(id, turn_id, ItemPayload::ToolCall(tool))
    }

    /// A standalone error item (fresh id).
    pub fn error(turn_id: TurnId, message: impl Into<String>) -> Self {
        Self::new(ItemId::new(), turn_id, ItemPayload::Error { message: message.into() })
    }

    /// The terminal marker for a turn (fresh id).
    pub fn final_marker(turn_id: TurnId, content: Option<String>) -> Self {
        Self::new(ItemId::new(), turn_id, ItemPayload::Final { content })
    }

    /// A skill-activation marker (fresh id).
    pub fn skill_activated(
        turn_id: TurnId,
        skill_id: impl Into<String>,
        skill_name: impl Into<String>,
        trigger: SkillTrigger,
    ) -> Self {
        Self::new(
            ItemId::new(),
            turn_id,
            ItemPayload::SkillActivated {
                skill_id: skill_id.into(),
                skill_name: skill_name.into(),
                trigger,
            },
        )
    }

    /// The waiting placeholder for a turn (id embeds the turn id).
    pub fn waiting(turn_id: TurnId) -> Self {
        let id = ItemId::waiting_for(&turn_id);
        Self::new(id, turn_id, ItemPayload::Waiting { note: None })
    }

    /// An extension marker (fresh id) carrying a domain payload.
    pub fn extension(turn_id: TurnId, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            ItemId::new(),
            turn_id,
            ItemPayload::Extension { kind: kind.into(), data },
        )
    }

    /// Whether this is the waiting placeholder.
    pub fn is_waiting(&self) -> bool {
        matches!(self.payload, ItemPayload::Waiting { .. })
    }

    /// The wire discriminant of the payload.
    pub fn kind_str(&self) -> &'static str {
        self.payload.kind_str()
    }

    /// Borrow the cluster payload, if this is a model call.
    pub fn as_model_call(&self) -> Option<&ModelCallItem> {
        match &self.payload {
            ItemPayload::ModelCall(call) => Some(call),
            _ => None,
        }
    }

    /// Mutably borrow the cluster payload, if this is a model call.
    pub fn as_model_call_mut(&mut self) -> Option<&mut ModelCallItem> {
        match &mut self.payload {
            ItemPayload::ModelCall(call) => Some(call),
            _ => None,
        }
    }

    /// Borrow the tool-call payload, if this is a tool call.
    pub fn as_tool_call(&self) -> Option<&ToolCallItem> {
        match &self.payload {
            ItemPayload::ToolCall(tool) => Some(tool),
            _ => None,
        }
    }

    /// Mutably borrow the tool-call payload, if this is a tool call.
    pub fn as_tool_call_mut(&mut self) -> Option<&mut ToolCallItem> {
        match &mut self.payload {
            ItemPayload::ToolCall(tool) => Some(tool),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ── CallStatus ──────────────────────────────────────────────────────

    #[test]
    fn test_status_as_str_roundtrip() {
        for s in [
            CallStatus::Running,
            CallStatus::Success,
            CallStatus::Error,
            CallStatus::Empty,
        ] {
            assert_eq!(CallStatus::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_status_aliases() {
        assert_eq!(CallStatus::from_str("done"), Some(CallStatus::Success));
        assert_eq!(CallStatus::from_str("FAILED"), Some(CallStatus::Error));
        assert_eq!(CallStatus::from_str("not_found"), Some(CallStatus::Error));
        assert_eq!(CallStatus::from_str("Active"), Some(CallStatus::Running));
        assert_eq!(CallStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!CallStatus::Running.is_terminal());
        assert!(CallStatus::Success.is_terminal());
        assert!(CallStatus::Error.is_terminal());
        assert!(CallStatus::Empty.is_terminal());
    }

    // ── Role ────────────────────────────────────────────────────────────

    #[test]
    fn test_role_aliases() {
        assert_eq!(Role::from_str("human"), Some(Role::User));
        assert_eq!(Role::from_str("model"), Some(Role::Assistant));
        assert_eq!(Role::from_str("AGENT"), Some(Role::Assistant));
        assert_eq!(Role::from_str("system"), Some(Role::System));
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    // ── SubItem ─────────────────────────────────────────────────────────

    #[test]
    fn test_open_reasoning_starts_open() {
        let cluster = ItemId::from("call-1");
        let sub = SubItem::open_reasoning(&cluster, 0, "hmm");
        assert!(sub.is_open());
        assert!(sub.is_reasoning());
        assert_eq!(sub.text(), Some("hmm"));
        assert_eq!(sub.id().as_str(), "call-1-reasoning-0");
    }

    #[test]
    fn test_push_text_appends() {
        let cluster = ItemId::from("call-1");
        let mut sub = SubItem::open_content(&cluster, 0, "He");
        sub.push_text("llo");
        assert_eq!(sub.text(), Some("Hello"));
    }

    #[test]
    fn test_close_flips_open() {
        let cluster = ItemId::from("call-1");
        let mut sub = SubItem::open_reasoning(&cluster, 0, "x");
        sub.close();
        assert!(!sub.is_open());
    }

    #[test]
    fn test_search_results_never_open() {
        let cluster = ItemId::from("call-1");
        let mut sub = SubItem::search_results(&cluster, 2, vec![]);
        assert!(!sub.is_open());
        sub.push_text("ignored");
        assert_eq!(sub.text(), None);
    }

    #[test]
    fn test_closed_subitem_serde_omits_is_open() {
        let cluster = ItemId::from("c");
        let mut sub = SubItem::open_content(&cluster, 0, "hi");
        sub.close();
        let json = serde_json::to_string(&sub).unwrap();
        assert!(!json.contains("is_open"));
        let back: SubItem = serde_json::from_str(&json).unwrap();
        assert!(!back.is_open());
    }

    #[test]
    fn test_subitem_json_roundtrip() {
        let cluster = ItemId::from("call-7");
        let sub = SubItem::open_reasoning(&cluster, 1, "deep thought");
        let json = serde_json::to_string(&sub).unwrap();
        let back: SubItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sub);
    }

    // ── ModelCallItem ───────────────────────────────────────────────────

    #[test]
    fn test_cluster_starts_running() {
        let call = ModelCallItem::running(Some(12));
        assert_eq!(call.status, CallStatus::Running);
        assert!(call.children.is_empty());
        assert_eq!(call.message_count, Some(12));
        assert!(call.started_at > 0);
    }

    #[test]
    fn test_push_child_maintains_index() {
        let cluster = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_reasoning(&cluster, 0, "a"));
        call.push_child(SubItem::open_content(&cluster, 1, "b"));
        for (i, child) in call.children.iter().enumerate() {
            assert_eq!(call.child_index[child.id()], i);
        }
        assert!(call.child(&SubItemId::child_of(&cluster, "content", 1)).is_some());
    }

    #[test]
    fn test_push_child_ignores_duplicate_id() {
        let cluster = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_reasoning(&cluster, 0, "a"));
        call.push_child(SubItem::open_reasoning(&cluster, 0, "b"));
        assert_eq!(call.children.len(), 1);
        assert_eq!(call.children[0].text(), Some("a"));
    }

    #[test]
    fn test_close_success_with_children() {
        let cluster = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_content(&cluster, 0, "hi"));
        call.close(None, Some(450));
        assert_eq!(call.status, CallStatus::Success);
        assert_eq!(call.reported_elapsed_ms, Some(450));
        assert!(call.elapsed_ms.is_some());
    }

    #[test]
    fn test_close_error_wins_over_children() {
        let cluster = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_content(&cluster, 0, "partial"));
        call.close(Some("overloaded".into()), None);
        assert_eq!(call.status, CallStatus::Error);
        assert_eq!(call.error.as_deref(), Some("overloaded"));
    }

    #[test]
    fn test_close_seals_open_fragments() {
        let cluster = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_content(&cluster, 0, "strea"));
        call.close(None, None);
        assert!(call.children.iter().all(|c| !c.is_open()));
        assert_eq!(call.status, CallStatus::Success);
    }

    #[test]
    fn test_close_childless_is_empty() {
        let mut call = ModelCallItem::running(None);
        call.close(None, None);
        assert_eq!(call.status, CallStatus::Empty);
    }

    #[test]
    fn test_close_is_one_shot() {
        let mut call = ModelCallItem::running(None);
        call.close(None, None);
        call.close(Some("late error".into()), None);
        assert_eq!(call.status, CallStatus::Empty);
        assert!(call.error.is_none());
    }

    #[test]
    fn test_open_child_mut_finds_open_fragment() {
        let cluster = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_reasoning(&cluster, 0, "a"));
        assert!(call.open_child_mut().is_some());
        call.close_open_children();
        assert!(call.open_child_mut().is_none());
    }

    #[test]
    fn test_closed_success_builds_index() {
        let cluster = ItemId::from("a1");
        let call = ModelCallItem::closed_success(
            vec![SubItem::closed_content(&cluster, 0, "hello")],
            Some(1200),
        );
        assert_eq!(call.status, CallStatus::Success);
        assert_eq!(call.elapsed_ms, Some(1200));
        assert_eq!(call.child_index.len(), 1);
    }

    // ── ToolCallItem ────────────────────────────────────────────────────

    #[test]
    fn test_tool_call_lifecycle() {
        let mut tool = ToolCallItem::running("skill_search", Some(serde_json::json!({"q": "tax"})));
        assert_eq!(tool.status, CallStatus::Running);
        let preview = serde_json::json!([{"name": "Tax Law", "score": 0.93}]);
        tool.close(None, Some(preview.clone()), Some(3), None);
        assert_eq!(tool.status, CallStatus::Success);
        assert_eq!(tool.count, Some(3));
        assert_eq!(tool.output, Some(preview));
        assert!(tool.elapsed_ms.is_some());
    }

    #[test]
    fn test_tool_call_error_payload_wins() {
        let mut tool = ToolCallItem::running("extract", None);
        tool.close(Some(CallStatus::Success), None, None, Some("boom".into()));
        assert_eq!(tool.status, CallStatus::Error);
    }

    #[test]
    fn test_tool_call_reported_status_used() {
        let mut tool = ToolCallItem::running("extract", None);
        tool.close(Some(CallStatus::Error), None, None, None);
        assert_eq!(tool.status, CallStatus::Error);
    }

    #[test]
    fn test_tool_call_empty_report_kept() {
        // search with zero hits ends `empty`; that terminal state survives.
        let mut tool = ToolCallItem::running("search_skills", None);
        tool.close(Some(CallStatus::Empty), None, Some(0), None);
        assert_eq!(tool.status, CallStatus::Empty);
    }

    #[test]
    fn test_tool_call_non_terminal_report_closes_success() {
        // An end event always ends the call: a nonsense `running` report
        // must not leave the item re-closable.
        let mut tool = ToolCallItem::running("extract", None);
        tool.close(Some(CallStatus::Running), None, None, None);
        assert_eq!(tool.status, CallStatus::Success);
        let elapsed = tool.elapsed_ms;
        tool.close(None, None, None, Some("late".into()));
        assert_eq!(tool.status, CallStatus::Success);
        assert_eq!(tool.elapsed_ms, elapsed);
    }

    #[test]
    fn test_tool_call_close_is_one_shot() {
        let mut tool = ToolCallItem::running("extract", None);
        tool.close(None, Some("out".into()), None, None);
        let elapsed = tool.elapsed_ms;
        tool.close(None, Some("other".into()), None, None);
        assert_eq!(tool.output, Some("out".into()));
        assert_eq!(tool.elapsed_ms, elapsed);
    }

    // ── TimelineItem ────────────────────────────────────────────────────

    #[test]
    fn test_user_item_serde_tag() {
        let item = TimelineItem::user(ItemId::from("u1"), TurnId::from("u1"), "hi");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["id"], "u1");
        let back: TimelineItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_waiting_id_embeds_turn() {
        let item = TimelineItem::waiting(TurnId::from("t9"));
        assert!(item.is_waiting());
        assert_eq!(item.id.as_str(), "waiting-t9");
    }

    #[test]
    fn test_model_call_item_roundtrip() {
        let id = ItemId::from("call-1");
        let mut call = ModelCallItem::running(None);
        call.push_child(SubItem::open_content(&id, 0, "partial"));
        let item = TimelineItem::model_call(id, TurnId::from("t1"), call);
        let json = serde_json::to_string(&item).unwrap();
        let back: TimelineItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
        assert!(back.as_model_call().is_some());
        assert!(back.as_tool_call().is_none());
    }

    #[test]
    fn test_skill_activated_flattens_trigger() {
        let item = TimelineItem::skill_activated(
            TurnId::from("t1"),
            "tax-calc",
            "Tax Calculator",
            SkillTrigger {
                kind: SkillTriggerKind::Keyword,
                trigger_keyword: Some("tax".into()),
            },
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "skill_activated");
        assert_eq!(json["trigger_type"], "keyword");
        assert_eq!(json["trigger_keyword"], "tax");
    }

    #[test]
    fn test_extension_item_carries_arbitrary_data() {
        let item = TimelineItem::extension(
            TurnId::from("t1"),
            "intent",
            serde_json::json!({"keywords": ["vat", "rate"]}),
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "extension");
        assert_eq!(json["kind"], "intent");
        assert_eq!(json["data"]["keywords"][0], "vat");
    }

    #[test]
    fn test_final_marker_optional_content() {
        let with = TimelineItem::final_marker(TurnId::from("t"), Some("done".into()));
        let without = TimelineItem::final_marker(TurnId::from("t"), None);
        let j1 = serde_json::to_string(&with).unwrap();
        let j2 = serde_json::to_string(&without).unwrap();
        assert!(j1.contains("done"));
        assert!(!j2.contains("content"));
    }

    #[test]
    fn test_item_ids_differ_for_fresh_items() {
        let a = TimelineItem::error(TurnId::from("t"), "x");
        let b = TimelineItem::error(TurnId::from("t"), "x");
        assert_ne!(a.id, b.id);
    }
}
