//! History replay: rebuild a timeline from persisted conversation records.
//!
//! Loading history is not streaming. Records map straight onto the same
//! item shapes a live stream produces, with no reducers involved: a user
//! record's id doubles as its turn id (the convention a live send also uses
//! for the provisional turn), and an assistant record becomes an
//! already-closed cluster under the preceding user's turn.

use skein_types::{HistoryRecord, ModelCallItem, Role, SubItem, TimelineItem, TurnId};
use tracing::trace;

use crate::state::TimelineState;

/// Build a quiescent state from records in chronological order.
///
/// The result has no active turn and is not streaming; the next send
/// starts a fresh turn on top of it. System records carry prompt plumbing,
/// not conversation, and are skipped.
pub fn rebuild(records: &[HistoryRecord]) -> TimelineState {
    let mut state = TimelineState::new();
    let mut last_user_turn: Option<TurnId> = None;
    for record in records {
        match record.role {
            Role::User => {
                let turn_id = TurnId::from(&record.id);
                state = state.with_item(TimelineItem::user(
                    record.id.clone(),
                    turn_id.clone(),
                    &record.content,
                ));
                last_user_turn = Some(turn_id);
            }
            Role::Assistant => {
                let turn_id = last_user_turn
                    .clone()
                    .unwrap_or_else(|| TurnId::from(&record.id));
                let cluster_id = record.id.clone();
                let children = vec![SubItem::closed_content(&cluster_id, 0, &record.content)];
                let call = ModelCallItem::closed_success(children, record.latency_ms);
                state = state.with_item(TimelineItem::model_call(cluster_id, turn_id, call));
            }
            Role::System => {
                trace!(id = %record.id, "system record skipped in timeline rebuild");
            }
        }
    }
    state
}
