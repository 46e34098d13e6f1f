//! Skill-retrieval flow: an [`EventReducer`] for the middleware events a
//! skill-augmented backend emits between the user's send and the first
//! model call.
//!
//! Vocabulary handled here (everything else falls through):
//!
//! | event type               | effect                                      |
//! |--------------------------|---------------------------------------------|
//! | `intent.extracted`       | supersede waiting placeholder, keep marker  |
//! | `search.query.built`     | waiting note: what is being searched        |
//! | `agent.thinking`         | waiting note: free-form progress line       |
//! | `phase.changed`          | waiting note: pipeline phase label          |
//! | `search.results.found`   | hits inline into the streaming cluster, or  |
//! |                          | a standalone marker when none is open       |
//! | `skill.summaries.loaded` | standalone marker                           |
//! | `tools.registered`       | standalone marker                           |
//!
//! Every claimed event is consumed even when it can't be applied (missing
//! turn, undecodable payload): half of this vocabulary would otherwise hit
//! the base reducer's unknown-event path and get re-logged there.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use skein_types::{Envelope, ItemId, ItemPayload, SkillHit, StreamEvent, SubItem, TimelineItem};
use tracing::{debug, trace};

use crate::compose::EventReducer;
use crate::state::TimelineState;

/// Handler for the skill-retrieval event vocabulary.
#[derive(Clone, Copy, Debug, Default)]
pub struct SkillFlowReducer;

impl EventReducer for SkillFlowReducer {
    fn try_reduce(&self, state: &TimelineState, event: &StreamEvent) -> Option<TimelineState> {
        let StreamEvent::Other(envelope) = event else {
            return None;
        };
        match envelope.event_type.as_str() {
            "intent.extracted" => Some(intent_extracted(state, envelope)),
            "search.query.built" => Some(query_built(state, envelope)),
            "search.results.found" => Some(results_found(state, envelope)),
            "skill.summaries.loaded" => Some(summaries_loaded(state, envelope)),
            "tools.registered" => Some(tools_registered(state, envelope)),
            "agent.thinking" => Some(thinking(state, envelope)),
            "phase.changed" => Some(phase_changed(state, envelope)),
            _ => None,
        }
    }

    fn name(&self) -> &str {
        "skill-flow"
    }
}

#[derive(Debug, Deserialize)]
struct IntentExtracted {
    keywords: Vec<String>,
    #[serde(default)]
    intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryBuilt {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ResultsFound {
    #[serde(default)]
    count: Option<u32>,
    skills: Vec<SkillHit>,
}

#[derive(Debug, Deserialize)]
struct SummariesLoaded {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct ToolsRegistered {
    tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Thinking {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhaseChanged {
    phase: String,
}

/// Intent analysis finished: the turn is definitely progressing, so the
/// waiting placeholder goes the same way `model-call.start` takes it, and
/// an extension marker keeps the extracted keywords on the timeline.
fn intent_extracted(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<IntentExtracted>(envelope) else {
        return state.clone();
    };
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!("intent extracted with no active turn, dropping");
        return state.clone();
    };
    debug!(
        keywords = ?payload.keywords,
        intent = payload.intent.as_deref(),
        "intent extracted"
    );
    state
        .clone()
        .without_item(&ItemId::waiting_for(&turn_id))
        .with_item(TimelineItem::extension(
            turn_id,
            "intent",
            envelope.payload.clone(),
        ))
}

fn query_built(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<QueryBuilt>(envelope) else {
        return state.clone();
    };
    with_waiting_note(state, format!("searching: {}", payload.query))
}

fn thinking(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<Thinking>(envelope) else {
        return state.clone();
    };
    match payload.message {
        Some(message) => with_waiting_note(state, message),
        None => state.clone(),
    }
}

fn phase_changed(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<PhaseChanged>(envelope) else {
        return state.clone();
    };
    with_waiting_note(state, payload.phase)
}

/// Retrieval hits land inside the cluster that is streaming right now;
/// with no cluster open they become a standalone marker instead.
fn results_found(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<ResultsFound>(envelope) else {
        return state.clone();
    };
    let Some(turn) = state.active_turn() else {
        trace!("search results with no active turn, dropping");
        return state.clone();
    };
    debug!(
        count = ?payload.count,
        hits = payload.skills.len(),
        "skill search results"
    );
    match turn.current_model_call.clone() {
        Some(call_id) => state.clone().updated(&call_id, |item| {
            if let Some(call) = item.as_model_call_mut() {
                let ordinal = call.children.len();
                call.push_child(SubItem::search_results(&call_id, ordinal, payload.skills));
            }
        }),
        None => {
            let turn_id = turn.turn_id.clone();
            state.clone().with_item(TimelineItem::extension(
                turn_id,
                "search_results",
                envelope.payload.clone(),
            ))
        }
    }
}

fn summaries_loaded(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<SummariesLoaded>(envelope) else {
        return state.clone();
    };
    debug!(count = payload.count, "skill summaries loaded");
    marker(state, envelope, "skill_summaries")
}

fn tools_registered(state: &TimelineState, envelope: &Envelope) -> TimelineState {
    let Some(payload) = decode::<ToolsRegistered>(envelope) else {
        return state.clone();
    };
    debug!(tools = ?payload.tools, "skill tools registered");
    marker(state, envelope, "tools_registered")
}

fn with_waiting_note(state: &TimelineState, note: String) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!("waiting note with no active turn, dropping");
        return state.clone();
    };
    state.clone().updated(&ItemId::waiting_for(&turn_id), |item| {
        if let ItemPayload::Waiting { note: slot } = &mut item.payload {
            *slot = Some(note);
        }
    })
}

fn marker(state: &TimelineState, envelope: &Envelope, kind: &str) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!(event_type = %envelope.event_type, "skill marker with no active turn, dropping");
        return state.clone();
    };
    state.clone().with_item(TimelineItem::extension(
        turn_id,
        kind,
        envelope.payload.clone(),
    ))
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Option<T> {
    match serde_json::from_value(envelope.payload.clone()) {
        Ok(value) => Some(value),
        Err(err) => {
            trace!(
                event_type = %envelope.event_type,
                %err,
                "skill event payload undecodable, dropping"
            );
            None
        }
    }
}
