//! The wire event contract: envelope, per-type payloads, strict decode.
//!
//! Transport hands the session raw [`Envelope`]s. Decode happens exactly once
//! at that boundary: the envelope's `type` selects a payload struct, the
//! payload is validated as a whole, and the reducer only ever sees typed
//! [`StreamEvent`]s. A recognized type with a malformed payload is dropped
//! here (`None`); an unrecognized type passes through as
//! [`StreamEvent::Other`] so extension reducers get a look before it falls
//! out as a no-op.
//!
//! ```text
//! ┌───────────┐    ┌──────────────┐    ┌───────────────────────────┐
//! │ transport │ →  │  Envelope    │ →  │ StreamEvent::decode       │
//! │ (chunked  │    │  seq/type/   │    │   known   → typed payload │
//! │  stream)  │    │  ids/payload │    │   unknown → Other(env)    │
//! └───────────┘    └──────────────┘    │   invalid → None (drop)   │
//!                                      └───────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, ItemId, TurnId};
use crate::item::{CallStatus, SkillTrigger};

/// The transport-independent event envelope.
///
/// `seq` starts at 1 and increases per stream; the core treats it as an
/// ordering hint only (gaps and regressions are logged upstream, never
/// corrected). `message_id` names the assistant message the stream is
/// producing, which doubles as the turn id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub conversation_id: ConversationId,
    pub message_id: TurnId,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build an envelope (test sources and transport adapters).
    pub fn new(
        seq: u64,
        event_type: impl Into<String>,
        conversation_id: impl Into<ConversationId>,
        message_id: impl Into<TurnId>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            seq,
            event_type: event_type.into(),
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            payload,
        }
    }
}

// ── Per-type payloads ───────────────────────────────────────────────────────

/// `meta.start` — the backend assigned ids and opened the turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetaStart {
    /// The real turn id, replacing the client's provisional one.
    pub assistant_message_id: TurnId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message_id: Option<ItemId>,
    /// Agent mode label (e.g. "agent"). Informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// Payload of `model-call.start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCallStart {
    pub call_id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
}

/// `model-call.end`: the invocation closed, successfully or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCallEnd {
    pub call_id: ItemId,
    /// Backend-side elapsed; recorded but not authoritative for display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One text increment (`assistant.reasoning.delta` / `assistant.delta`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub delta: String,
}

/// `assistant.final` — the turn's answer is complete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistantFinal {
    /// Canonical full answer text, when the backend sends it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Payload of `tool.start`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolStart {
    pub tool_call_id: ItemId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

/// Payload of `tool.end`. Everything the run produced is optional; the
/// id is not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolEnd {
    pub tool_call_id: ItemId,
    /// Reported in the backend's vocabulary, which is wider than the
    /// canonical set; unrecognized strings read as `Error` so the end
    /// event still closes the call.
    #[serde(
        default,
        deserialize_with = "wire_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<CallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Result preview as sent: a string, a list of hits, or an object.
    #[serde(default, alias = "output_preview", skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// Lenient status parse for `tool.end`: `not_found` and friends are failure
/// reports, not malformed envelopes. A non-string value still fails decode.
fn wire_status<'de, D>(de: D) -> Result<Option<CallStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.map(|s| CallStatus::from_str(&s).unwrap_or(CallStatus::Error)))
}

/// `error` — a top-level failure surfaced by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorSignal {
    pub message: String,
}

/// `skill.activated`: a skill was selected for this turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillActivated {
    pub skill_id: String,
    pub skill_name: String,
    #[serde(flatten)]
    pub trigger: SkillTrigger,
}

// ── Decoded events ──────────────────────────────────────────────────────────

/// A strictly decoded stream event.
///
/// The base reducer dispatches on these; extension reducers additionally
/// inspect [`Other`](StreamEvent::Other) for their own vocabularies.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Turn opened / ids assigned.
    MetaStart(MetaStart),
    /// Model invocation opened.
    ModelCallStart(ModelCallStart),
    /// Model invocation closed.
    ModelCallEnd(ModelCallEnd),
    /// Reasoning text increment.
    ReasoningDelta(Delta),
    /// Answer text increment.
    ContentDelta(Delta),
    /// Turn answer complete.
    AssistantFinal(AssistantFinal),
    /// Tool invocation opened.
    ToolStart(ToolStart),
    /// Tool invocation closed.
    ToolEnd(ToolEnd),
    /// Standalone failure report.
    Error(ErrorSignal),
    /// Skill selected for the turn.
    SkillActivated(SkillActivated),
    /// Unrecognized type, envelope kept whole for extension reducers.
    Other(Envelope),
}

impl StreamEvent {
    /// Decode an envelope into a typed event.
    ///
    /// `None` means "drop": a recognized type whose payload fails strict
    /// validation (missing required field, blank required id, wrong shape).
    /// Unknown types are never dropped here — they become [`Self::Other`].
    pub fn decode(env: Envelope) -> Option<Self> {
        fn parse<T: serde::de::DeserializeOwned>(
            event_type: &str,
            payload: serde_json::Value,
        ) -> Option<T> {
            match serde_json::from_value(payload) {
                Ok(v) => Some(v),
                Err(err) => {
                    tracing::trace!(%event_type, %err, "malformed payload, dropping event");
                    None
                }
            }
        }

        let event = match env.event_type.as_str() {
            "meta.start" => {
                let p: MetaStart = parse(&env.event_type, env.payload)?;
                if p.assistant_message_id.is_empty() {
                    tracing::trace!("meta.start with blank assistant_message_id, dropping");
                    return None;
                }
                Self::MetaStart(p)
            }
            "model-call.start" => {
                let p: ModelCallStart = parse(&env.event_type, env.payload)?;
                if p.call_id.is_empty() {
                    return None;
                }
                Self::ModelCallStart(p)
            }
            "model-call.end" => {
                let p: ModelCallEnd = parse(&env.event_type, env.payload)?;
                if p.call_id.is_empty() {
                    return None;
                }
                Self::ModelCallEnd(p)
            }
            "assistant.reasoning.delta" => {
                Self::ReasoningDelta(parse(&env.event_type, env.payload)?)
            }
            "assistant.delta" => Self::ContentDelta(parse(&env.event_type, env.payload)?),
            "assistant.final" => Self::AssistantFinal(parse(&env.event_type, env.payload)?),
            "tool.start" => {
                let p: ToolStart = parse(&env.event_type, env.payload)?;
                if p.tool_call_id.is_empty() {
                    return None;
                }
                Self::ToolStart(p)
            }
            "tool.end" => {
                let p: ToolEnd = parse(&env.event_type, env.payload)?;
                if p.tool_call_id.is_empty() {
                    return None;
                }
                Self::ToolEnd(p)
            }
            "error" => Self::Error(parse(&env.event_type, env.payload)?),
            "skill.activated" => Self::SkillActivated(parse(&env.event_type, env.payload)?),
            _ => Self::Other(env),
        };
        Some(event)
    }

    /// Check if this is a delta event (reasoning or content).
    pub fn is_delta(&self) -> bool {
        matches!(self, Self::ReasoningDelta(_) | Self::ContentDelta(_))
    }

    /// Check if this event closes the turn's streaming phase.
    ///
    /// Only `assistant.final` does; `error` reports a failure without
    /// closing anything.
    pub fn closes_turn(&self) -> bool {
        matches!(self, Self::AssistantFinal(_))
    }

    /// The wire type name, for logging.
    pub fn event_type(&self) -> &str {
        match self {
            Self::MetaStart(_) => "meta.start",
            Self::ModelCallStart(_) => "model-call.start",
            Self::ModelCallEnd(_) => "model-call.end",
            Self::ReasoningDelta(_) => "assistant.reasoning.delta",
            Self::ContentDelta(_) => "assistant.delta",
            Self::AssistantFinal(_) => "assistant.final",
            Self::ToolStart(_) => "tool.start",
            Self::ToolEnd(_) => "tool.end",
            Self::Error(_) => "error",
            Self::SkillActivated(_) => "skill.activated",
            Self::Other(env) => &env.event_type,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
