//! End-to-end tests for the session controller over scripted event streams.
//!
//! # Scenarios
//!
//! - **Streamed turn:** builder → send → full event script through the
//!   composer, skill-flow reducer included, down to the closed timeline
//! - **Abort:** cooperative cancel mid-stream purges the turn and leaves
//!   the session reusable
//! - **Transport failure:** partial progress is kept, the error is sticky
//! - **Exhaustion:** a stream that dies without a final still closes the turn
//! - **History:** rebuilt records followed by a live turn on one timeline

use std::collections::VecDeque;

use skein_session::{
    AbortHandle, EventSource, ScriptedSource, SendOutcome, Session, SessionError,
    SkillFlowReducer, TransportError,
};
use skein_types::{CallStatus, Envelope, HistoryRecord, ItemId, ItemPayload, Role, TurnId};

// ============================================================================
// Shared test setup
// ============================================================================

fn env(seq: u64, event_type: &str, payload: serde_json::Value) -> Envelope {
    Envelope::new(seq, event_type, "conv-1", "real-1", payload)
}

/// Script for one complete assistant turn: rename, intent, one model call
/// with reasoning and content, call end, final.
fn full_turn_script() -> Vec<Envelope> {
    vec![
        env(
            1,
            "meta.start",
            serde_json::json!({"assistant_message_id": "real-1", "mode": "chat"}),
        ),
        env(
            2,
            "intent.extracted",
            serde_json::json!({"keywords": ["vat", "deadline"], "intent": "tax question"}),
        ),
        env(
            3,
            "model-call.start",
            serde_json::json!({"call_id": "call-1", "message_count": 3}),
        ),
        env(
            4,
            "assistant.reasoning.delta",
            serde_json::json!({"delta": "Check the deferral rules."}),
        ),
        env(5, "assistant.delta", serde_json::json!({"delta": "You can "})),
        env(6, "assistant.delta", serde_json::json!({"delta": "defer VAT."})),
        env(
            7,
            "model-call.end",
            serde_json::json!({"call_id": "call-1", "elapsed_ms": 1800}),
        ),
        env(
            8,
            "assistant.final",
            serde_json::json!({"content": "You can defer VAT."}),
        ),
    ]
}

fn kinds(session: &Session) -> Vec<&'static str> {
    session
        .state()
        .items()
        .iter()
        .map(|item| item.kind_str())
        .collect()
}

/// Source that replays a script and then presses the stop button instead of
/// yielding, as a user would when the stream stalls.
struct AbortAfter {
    script: VecDeque<Envelope>,
    handle: AbortHandle,
}

impl AbortAfter {
    fn new(handle: AbortHandle, envelopes: impl IntoIterator<Item = Envelope>) -> Self {
        Self {
            script: envelopes.into_iter().collect(),
            handle,
        }
    }
}

impl EventSource for AbortAfter {
    async fn next_event(&mut self) -> Option<Result<Envelope, TransportError>> {
        match self.script.pop_front() {
            Some(envelope) => Some(Ok(envelope)),
            None => {
                self.handle.abort();
                std::future::pending().await
            }
        }
    }
}

// ============================================================================
// Streamed turn, composer included
// ============================================================================

#[tokio::test]
async fn streamed_turn_builds_complete_timeline() {
    let mut session = Session::builder()
        .with_reducer(Box::new(SkillFlowReducer))
        .build();

    let outcome = session
        .send_message("what about VAT?", ScriptedSource::of(full_turn_script()))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SendOutcome::Completed {
            turn_id: TurnId::from("real-1")
        }
    );
    assert!(!session.is_streaming());
    assert_eq!(session.last_seq(), 8);
    assert_eq!(session.last_error(), None);
    assert_eq!(
        session.conversation_id().map(|id| id.as_str()),
        Some("conv-1")
    );

    // The waiting placeholder was superseded by the intent marker.
    assert_eq!(kinds(&session), vec!["user", "extension", "model_call", "final"]);

    let items = session.state().items();
    for item in items {
        assert_eq!(item.turn_id, TurnId::from("real-1"), "item {} kept provisional turn", item.id);
    }

    match &items[0].payload {
        ItemPayload::User { content } => assert_eq!(content, "what about VAT?"),
        other => panic!("expected user payload, got {}", other.kind_str()),
    }
    match &items[1].payload {
        ItemPayload::Extension { kind, .. } => assert_eq!(kind, "intent"),
        other => panic!("expected extension payload, got {}", other.kind_str()),
    }

    let call = session
        .state()
        .get(&ItemId::from("call-1"))
        .and_then(|item| item.as_model_call())
        .expect("model call cluster");
    assert_eq!(call.message_count, Some(3));
    assert_eq!(call.reported_elapsed_ms, Some(1800));
    assert_eq!(call.children.len(), 2);
    assert!(call.children[0].is_reasoning());
    assert_eq!(call.children[0].text(), Some("Check the deferral rules."));
    assert!(call.children[1].is_content());
    assert_eq!(call.children[1].text(), Some("You can defer VAT."));
    assert!(call.children.iter().all(|child| !child.is_open()));

    match &items[3].payload {
        ItemPayload::Final { content } => {
            assert_eq!(content.as_deref(), Some("You can defer VAT."));
        }
        other => panic!("expected final payload, got {}", other.kind_str()),
    }

    assert!(session.state().index_is_consistent());
}

#[tokio::test]
async fn sequential_turns_accumulate_on_one_timeline() {
    let mut session = Session::new();

    let first = [
        env(1, "meta.start", serde_json::json!({"assistant_message_id": "real-1"})),
        env(2, "model-call.start", serde_json::json!({"call_id": "c1"})),
        env(3, "assistant.delta", serde_json::json!({"delta": "one"})),
        env(4, "model-call.end", serde_json::json!({"call_id": "c1"})),
        env(5, "assistant.final", serde_json::json!({})),
    ];
    let second = [
        Envelope::new(
            1,
            "meta.start",
            "conv-1",
            "real-2",
            serde_json::json!({"assistant_message_id": "real-2"}),
        ),
        Envelope::new(2, "assistant.final", "conv-1", "real-2", serde_json::json!({})),
    ];

    let one = session
        .send_message("first", ScriptedSource::of(first))
        .await
        .unwrap();
    let two = session
        .send_message("second", ScriptedSource::of(second))
        .await
        .unwrap();

    assert_eq!(one, SendOutcome::Completed { turn_id: TurnId::from("real-1") });
    assert_eq!(two, SendOutcome::Completed { turn_id: TurnId::from("real-2") });

    // First turn: user, call, final. Second: user, waiting, final.
    assert_eq!(
        kinds(&session),
        vec!["user", "model_call", "final", "user", "waiting", "final"]
    );
    // Sequence tracking restarts per stream.
    assert_eq!(session.last_seq(), 2);
}

// ============================================================================
// Tool lifecycle on the wire
// ============================================================================

#[tokio::test]
async fn backend_tool_end_shapes_close_their_items() {
    let mut session = Session::new();
    let source = ScriptedSource::of([
        env(1, "meta.start", serde_json::json!({"assistant_message_id": "real-1"})),
        env(2, "model-call.start", serde_json::json!({"call_id": "call-1"})),
        env(
            3,
            "tool.start",
            serde_json::json!({"tool_call_id": "tc-search", "name": "search_skills",
                               "input": {"query": "vat"}}),
        ),
        env(
            4,
            "tool.end",
            serde_json::json!({
                "tool_call_id": "tc-search",
                "name": "search_skills",
                "status": "success",
                "count": 2,
                "output_preview": [{"name": "Tax Law", "score": 0.93}, {"name": "VAT Basics"}]
            }),
        ),
        env(
            5,
            "tool.start",
            serde_json::json!({"tool_call_id": "tc-get", "name": "get_skill_content"}),
        ),
        env(
            6,
            "tool.end",
            serde_json::json!({
                "tool_call_id": "tc-get",
                "name": "get_skill_content",
                "status": "not_found",
                "skill_id": "tax-law"
            }),
        ),
        env(7, "assistant.delta", serde_json::json!({"delta": "No such skill."})),
        env(8, "assistant.final", serde_json::json!({"content": "No such skill."})),
    ]);

    let outcome = session.send_message("load the vat skill", source).await.unwrap();

    assert!(matches!(outcome, SendOutcome::Completed { .. }));
    assert_eq!(
        kinds(&session),
        vec!["user", "model_call", "tool_call", "tool_call", "final"]
    );

    // No spinner survives the turn: both tool items reached terminal states.
    let search = session
        .state()
        .get(&ItemId::from("tc-search"))
        .and_then(|item| item.as_tool_call())
        .expect("search tool item");
    assert_eq!(search.status, CallStatus::Success);
    assert_eq!(search.count, Some(2));
    assert!(search.output.as_ref().is_some_and(|v| v.is_array()));

    let get = session
        .state()
        .get(&ItemId::from("tc-get"))
        .and_then(|item| item.as_tool_call())
        .expect("content tool item");
    assert_eq!(get.status, CallStatus::Error);
    assert!(get.status.is_terminal(), "tool left running: {:?}", get.status);
    assert!(get.elapsed_ms.is_some());
}

// ============================================================================
// Abort
// ============================================================================

#[tokio::test]
async fn abort_mid_stream_purges_turn_and_session_stays_usable() {
    let mut session = Session::new();
    let partial = [
        env(1, "meta.start", serde_json::json!({"assistant_message_id": "real-1"})),
        env(2, "model-call.start", serde_json::json!({"call_id": "c1"})),
        env(3, "assistant.delta", serde_json::json!({"delta": "half an ans"})),
    ];
    let source = AbortAfter::new(session.abort_handle(), partial);

    let outcome = session.send_message("stop me", source).await.unwrap();

    assert_eq!(outcome, SendOutcome::Aborted);
    assert!(!session.is_streaming());
    // Everything the aborted turn produced is gone, user message included.
    assert!(session.state().is_empty(), "kinds left: {:?}", kinds(&session));

    // The session is immediately reusable with a fresh stream.
    let retry = ScriptedSource::of([
        env(1, "meta.start", serde_json::json!({"assistant_message_id": "real-1"})),
        env(2, "assistant.final", serde_json::json!({"content": "second try"})),
    ]);
    let outcome = session.send_message("again", retry).await.unwrap();
    assert_eq!(outcome, SendOutcome::Completed { turn_id: TurnId::from("real-1") });
    assert_eq!(kinds(&session), vec!["user", "waiting", "final"]);
}

#[tokio::test]
async fn abort_before_any_event_purges_provisional_turn() {
    let mut session = Session::new();
    let source = AbortAfter::new(session.abort_handle(), []);

    let outcome = session.send_message("never sent", source).await.unwrap();

    assert_eq!(outcome, SendOutcome::Aborted);
    assert!(session.state().is_empty());
}

// ============================================================================
// Transport failure
// ============================================================================

#[tokio::test]
async fn transport_failure_keeps_partial_progress() {
    let mut session = Session::new();
    let mut source = ScriptedSource::of([
        env(1, "meta.start", serde_json::json!({"assistant_message_id": "real-1"})),
        env(2, "model-call.start", serde_json::json!({"call_id": "c1"})),
        env(3, "assistant.delta", serde_json::json!({"delta": "partial ans"})),
    ]);
    source.push_error(TransportError::ConnectionLost("socket reset".into()));

    let result = session.send_message("flaky", source).await;

    match result {
        Err(SessionError::Transport(TransportError::ConnectionLost(detail))) => {
            assert_eq!(detail, "socket reset");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(!session.is_streaming());
    assert_eq!(
        session.last_error(),
        Some("connection lost: socket reset")
    );

    // The applied prefix survives for rendering and retry decisions.
    assert_eq!(kinds(&session), vec!["user", "model_call"]);
    let call = session
        .state()
        .get(&ItemId::from("c1"))
        .and_then(|item| item.as_model_call())
        .unwrap();
    assert_eq!(call.children.len(), 1);
    assert_eq!(call.children[0].text(), Some("partial ans"));
}

// ============================================================================
// Exhaustion without a final
// ============================================================================

#[tokio::test]
async fn exhausted_stream_closes_turn_without_final() {
    let mut session = Session::new();
    let source = ScriptedSource::of([env(
        1,
        "meta.start",
        serde_json::json!({"assistant_message_id": "real-1"}),
    )]);

    let outcome = session.send_message("hello?", source).await.unwrap();

    assert_eq!(outcome, SendOutcome::Completed { turn_id: TurnId::from("real-1") });
    assert!(!session.is_streaming());
    // No final marker; the placeholder is all the turn produced.
    assert_eq!(kinds(&session), vec!["user", "waiting"]);
    // The turn id is still addressable for a later retry or cleanup.
    assert_eq!(session.state().current_turn(), Some(&TurnId::from("real-1")));
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn history_then_live_turn_share_one_timeline() {
    let mut session = Session::new();
    let records = vec![
        HistoryRecord::new("m1", Role::User, "earlier question"),
        HistoryRecord::new("m2", Role::Assistant, "earlier answer").with_latency(900),
    ];
    session.load_history(&records).unwrap();
    assert_eq!(kinds(&session), vec!["user", "model_call"]);

    let outcome = session
        .send_message("follow-up", ScriptedSource::of(full_turn_script()))
        .await
        .unwrap();

    assert_eq!(outcome, SendOutcome::Completed { turn_id: TurnId::from("real-1") });
    assert_eq!(
        kinds(&session),
        vec!["user", "model_call", "user", "extension", "model_call", "final"]
    );
    // History items keep their persisted ids and turns.
    assert_eq!(session.state().items()[0].id, ItemId::from("m1"));
    assert_eq!(session.state().items()[1].turn_id, TurnId::from("m1"));
    assert!(session.state().index_is_consistent());
}

#[tokio::test]
async fn load_history_replaces_previous_timeline() {
    let mut session = Session::new();
    session
        .send_message(
            "first",
            ScriptedSource::of([
                env(1, "meta.start", serde_json::json!({"assistant_message_id": "real-1"})),
                env(2, "assistant.final", serde_json::json!({})),
            ]),
        )
        .await
        .unwrap();
    assert!(!session.state().is_empty());

    session
        .load_history(&[HistoryRecord::new("m1", Role::User, "replacement")])
        .unwrap();
    assert_eq!(kinds(&session), vec!["user"]);
    assert_eq!(session.state().items()[0].id, ItemId::from("m1"));
}
