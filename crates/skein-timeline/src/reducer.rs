//! The base event reducer: decoded stream events in, timeline states out.
//!
//! [`reduce`] is one pure fold step. No I/O, no clock reads beyond the
//! elapsed stamps taken inside the item types, no global state. The per-turn
//! machine it drives:
//!
//! ```text
//! no-turn → waiting → streaming(model-call) ⇄ streaming(tool-call) → closed
//! ```
//!
//! The stream is external input, so malformed sequencing degrades to no-ops
//! rather than panics: unknown ids are ignored, deltas without a cluster are
//! dropped, and only `meta.start` may establish a turn out of thin air.

use skein_types::{
    AssistantFinal, Delta, ErrorSignal, ItemId, MetaStart, ModelCallEnd, ModelCallItem,
    ModelCallStart, SkillActivated, StreamEvent, TimelineItem, ToolCallItem, ToolEnd, ToolStart,
};
use tracing::{debug, trace};

use crate::aggregate;
use crate::state::{ActiveTurn, TimelineState};

/// Apply one decoded event, producing the next state.
pub fn reduce(state: TimelineState, event: &StreamEvent) -> TimelineState {
    match event {
        StreamEvent::MetaStart(meta) => start_turn(state, meta),
        StreamEvent::ModelCallStart(start) => open_cluster(state, start),
        StreamEvent::ModelCallEnd(end) => close_cluster(state, end),
        StreamEvent::ReasoningDelta(delta) => fold_reasoning(state, delta),
        StreamEvent::ContentDelta(delta) => fold_content(state, delta),
        StreamEvent::AssistantFinal(fin) => finish_turn(state, fin),
        StreamEvent::ToolStart(start) => open_tool(state, start),
        StreamEvent::ToolEnd(end) => close_tool(state, end),
        StreamEvent::Error(err) => record_error(state, err),
        StreamEvent::SkillActivated(skill) => note_skill(state, skill),
        StreamEvent::Other(envelope) => {
            trace!(event_type = %envelope.event_type, "unhandled event type, state unchanged");
            state
        }
    }
}

/// `meta.start`: reconcile the provisional turn id with the backend's real
/// one, or establish a turn when attaching without one.
fn start_turn(state: TimelineState, meta: &MetaStart) -> TimelineState {
    debug!(
        turn = %meta.assistant_message_id,
        user_message = ?meta.user_message_id,
        mode = ?meta.mode,
        "turn start"
    );
    let real = meta.assistant_message_id.clone();
    let current = state.current_turn().cloned();
    match current {
        Some(provisional) if provisional != real => state.renamed_turn(&provisional, real),
        Some(_) => state,
        None => state.with_active_turn(Some(ActiveTurn::streaming(real))),
    }
}

/// `model-call.start`: the waiting placeholder is superseded by a live
/// cluster, and deltas start routing to it.
fn open_cluster(state: TimelineState, start: &ModelCallStart) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!(call = %start.call_id, "model-call start with no active turn, dropping");
        return state;
    };
    let call_id = start.call_id.clone();
    state
        .without_item(&ItemId::waiting_for(&turn_id))
        .with_item(TimelineItem::model_call(
            call_id.clone(),
            turn_id,
            ModelCallItem::running(start.message_count),
        ))
        .map_active_turn(|turn| turn.current_model_call = Some(call_id))
}

/// `model-call.end`: flip the cluster status once and stop routing deltas
/// to it. A stale id (e.g. after an abort purge) is a no-op.
fn close_cluster(state: TimelineState, end: &ModelCallEnd) -> TimelineState {
    state
        .updated(&end.call_id, |item| {
            if let Some(call) = item.as_model_call_mut() {
                call.close(end.error.clone(), end.elapsed_ms);
            }
        })
        .map_active_turn(|turn| {
            if turn.current_model_call.as_ref() == Some(&end.call_id) {
                turn.current_model_call = None;
            }
        })
}

fn fold_reasoning(state: TimelineState, delta: &Delta) -> TimelineState {
    let Some(call_id) = current_cluster(&state) else {
        trace!("reasoning delta with no active cluster, dropping");
        return state;
    };
    state.updated(&call_id, |item| {
        if let Some(call) = item.as_model_call_mut() {
            aggregate::push_reasoning(&call_id, call, &delta.delta);
        }
    })
}

fn fold_content(state: TimelineState, delta: &Delta) -> TimelineState {
    let Some(call_id) = current_cluster(&state) else {
        trace!("content delta with no active cluster, dropping");
        return state;
    };
    state.updated(&call_id, |item| {
        if let Some(call) = item.as_model_call_mut() {
            aggregate::push_content(&call_id, call, &delta.delta);
        }
    })
}

/// `assistant.final`: seal anything still streaming, append the terminal
/// marker, and mark the turn closed. The turn id stays addressable until
/// the next send or reset.
fn finish_turn(state: TimelineState, fin: &AssistantFinal) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!("final with no active turn, dropping");
        return state;
    };
    // Cleanup for a missed call-end: no fragment stays open once the turn
    // is over.
    let still_open: Vec<ItemId> = state
        .turn_items(&turn_id)
        .filter(|item| {
            item.as_model_call()
                .is_some_and(|call| call.children.iter().any(|c| c.is_open()))
        })
        .map(|item| item.id.clone())
        .collect();
    let mut state = state;
    for id in still_open {
        state = state.updated(&id, |item| {
            if let Some(call) = item.as_model_call_mut() {
                call.close_open_children();
            }
        });
    }
    state
        .with_item(TimelineItem::final_marker(turn_id, fin.content.clone()))
        .map_active_turn(|turn| {
            turn.is_streaming = false;
            turn.current_model_call = None;
            turn.current_tool_call = None;
        })
}

/// `tool.start`: a tool item joins the timeline. The waiting placeholder
/// stays; only a model call or an intent marker supersedes it.
fn open_tool(state: TimelineState, start: &ToolStart) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!(tool = %start.name, "tool start with no active turn, dropping");
        return state;
    };
    let tool_id = start.tool_call_id.clone();
    state
        .with_item(TimelineItem::tool_call(
            tool_id.clone(),
            turn_id,
            ToolCallItem::running(&start.name, start.input.clone()),
        ))
        .map_active_turn(|turn| turn.current_tool_call = Some(tool_id))
}

fn close_tool(state: TimelineState, end: &ToolEnd) -> TimelineState {
    state
        .updated(&end.tool_call_id, |item| {
            if let Some(tool) = item.as_tool_call_mut() {
                tool.close(end.status, end.output.clone(), end.count, end.error.clone());
            }
        })
        .map_active_turn(|turn| {
            if turn.current_tool_call.as_ref() == Some(&end.tool_call_id) {
                turn.current_tool_call = None;
            }
        })
}

/// `error`: a standalone error item. The turn keeps streaming; only
/// `assistant.final` or an abort closes it.
fn record_error(state: TimelineState, err: &ErrorSignal) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!("error event with no active turn, dropping");
        return state;
    };
    debug!(message = %err.message, "stream error item");
    state.with_item(TimelineItem::error(turn_id, &err.message))
}

fn note_skill(state: TimelineState, skill: &SkillActivated) -> TimelineState {
    let Some(turn_id) = state.current_turn().cloned() else {
        trace!(skill = %skill.skill_name, "skill activation with no active turn, dropping");
        return state;
    };
    state.with_item(TimelineItem::skill_activated(
        turn_id,
        &skill.skill_id,
        &skill.skill_name,
        skill.trigger.clone(),
    ))
}

fn current_cluster(state: &TimelineState) -> Option<ItemId> {
    state
        .active_turn()
        .and_then(|turn| turn.current_model_call.clone())
}
