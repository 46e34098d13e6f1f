//! Timeline state: an ordered item list, an id index, and the active-turn
//! cursor.
//!
//! `TimelineState` is a persistent value. Every mutation consumes `self` and
//! returns the next state, so a snapshot handed to a renderer or a test is
//! never changed behind its back. The structural invariant maintained by
//! every operation here:
//!
//! ```text
//! index_by_id[id] == i  ⟺  timeline[i].id == id
//! ```
//!
//! Appends are O(1) amortized. The removal and rename paths rebuild the
//! whole index. They run once per cancellation or turn start, where O(n)
//! is trivially fine and much easier to audit than incremental repair.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use skein_types::{ItemId, TimelineItem, TurnId};

/// Cursor over the turn currently owning the stream.
///
/// At most one turn streams at a time. The call pointers name the cluster
/// or tool item that deltas and end events should land on; they hold ids,
/// not indices, so a removal can never leave them pointing at the wrong
/// slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTurn {
    /// Turn id all in-flight events are attributed to.
    pub turn_id: TurnId,
    /// Cluster receiving reasoning/content deltas, when one is open.
    pub current_model_call: Option<ItemId>,
    /// Tool-call item awaiting its end event, when one is running.
    pub current_tool_call: Option<ItemId>,
    /// False once the turn closed; the turn id stays addressable until the
    /// next send or reset.
    pub is_streaming: bool,
}

impl ActiveTurn {
    /// Fresh cursor for a turn that just started streaming.
    pub fn streaming(turn_id: TurnId) -> Self {
        Self {
            turn_id,
            current_model_call: None,
            current_tool_call: None,
            is_streaming: true,
        }
    }
}

/// One conversation's rendered timeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    /// Items in arrival order. Never reordered; removal is the only way an
    /// item leaves.
    timeline: Vec<TimelineItem>,
    /// Position of each item id in `timeline`.
    index_by_id: HashMap<ItemId, usize>,
    /// Present from the first turn start until reset; `None` only for a
    /// brand-new or rebuilt-from-history state.
    active_turn: Option<ActiveTurn>,
}

impl TimelineState {
    /// Empty timeline, no active turn.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of items.
    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    /// True when no items have arrived.
    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// All items in arrival order.
    pub fn items(&self) -> &[TimelineItem] {
        &self.timeline
    }

    /// Look up one item by id.
    pub fn get(&self, id: &ItemId) -> Option<&TimelineItem> {
        self.index_by_id.get(id).map(|&i| &self.timeline[i])
    }

    /// Position of an item in the timeline.
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    /// Items belonging to one turn, in arrival order.
    pub fn turn_items<'a>(
        &'a self,
        turn_id: &'a TurnId,
    ) -> impl Iterator<Item = &'a TimelineItem> {
        self.timeline.iter().filter(move |item| item.turn_id == *turn_id)
    }

    /// The active-turn cursor, if a turn has started.
    pub fn active_turn(&self) -> Option<&ActiveTurn> {
        self.active_turn.as_ref()
    }

    /// Turn id events are currently attributed to. Present even after the
    /// turn closed, until the next send or reset.
    pub fn current_turn(&self) -> Option<&TurnId> {
        self.active_turn.as_ref().map(|turn| &turn.turn_id)
    }

    /// Whether a turn is streaming right now.
    pub fn is_streaming(&self) -> bool {
        self.active_turn.as_ref().is_some_and(|turn| turn.is_streaming)
    }

    /// Diagnostic: does the id index exactly mirror the item list?
    pub fn index_is_consistent(&self) -> bool {
        self.index_by_id.len() == self.timeline.len()
            && self
                .timeline
                .iter()
                .enumerate()
                .all(|(i, item)| self.index_by_id.get(&item.id) == Some(&i))
    }

    // ========================================================================
    // Mutations (consume self, return the next state)
    // ========================================================================

    /// Append an item and index it.
    ///
    /// A duplicate id means a reducer bug upstream; the insert is ignored
    /// (warn-logged) so the index invariant survives.
    pub fn with_item(mut self, item: TimelineItem) -> Self {
        if self.index_by_id.contains_key(&item.id) {
            tracing::warn!(
                id = %item.id,
                kind = item.kind_str(),
                "duplicate timeline item id, ignoring insert"
            );
            return self;
        }
        self.index_by_id.insert(item.id.clone(), self.timeline.len());
        self.timeline.push(item);
        self
    }

    /// Update one item in place.
    ///
    /// An unknown id is a no-op: events may reference items already
    /// discarded, e.g. a stale call-end arriving after an abort. The
    /// closure must not change the item's identity.
    pub fn updated(mut self, id: &ItemId, f: impl FnOnce(&mut TimelineItem)) -> Self {
        match self.index_by_id.get(id).copied() {
            Some(i) => {
                f(&mut self.timeline[i]);
                debug_assert_eq!(
                    self.timeline[i].id, *id,
                    "updated closure must not change the item id"
                );
            }
            None => tracing::trace!(id = %id, "update for unknown item id, ignoring"),
        }
        self
    }

    /// Remove one item by id. Unknown id is a no-op.
    ///
    /// This is how the waiting placeholder is superseded; whole-turn removal
    /// would take the user's own item with it.
    pub fn without_item(mut self, id: &ItemId) -> Self {
        if !self.index_by_id.contains_key(id) {
            return self;
        }
        self.timeline.retain(|item| item.id != *id);
        self.rebuild_index();
        self
    }

    /// Remove every item belonging to a turn (cancellation cleanup).
    ///
    /// Also drops the active-turn cursor when it points at the removed turn,
    /// so the cursor never outlives the items it addresses.
    pub fn without_turn(mut self, turn_id: &TurnId) -> Self {
        let before = self.timeline.len();
        self.timeline.retain(|item| item.turn_id != *turn_id);
        if self.timeline.len() != before {
            self.rebuild_index();
        }
        if self
            .active_turn
            .as_ref()
            .is_some_and(|turn| turn.turn_id == *turn_id)
        {
            self.active_turn = None;
        }
        self
    }

    /// Retag a provisional turn id with the backend-assigned real one.
    ///
    /// The one sanctioned identity rewrite: every item carrying the
    /// provisional turn id is retagged, the waiting placeholder's own id is
    /// rewritten (it embeds the turn id), and the cursor follows. No other
    /// item changes its id.
    pub fn renamed_turn(mut self, provisional: &TurnId, real: TurnId) -> Self {
        if *provisional == real {
            return self;
        }
        let stale_waiting = ItemId::waiting_for(provisional);
        let fresh_waiting = ItemId::waiting_for(&real);
        for item in &mut self.timeline {
            if item.turn_id == *provisional {
                item.turn_id = real.clone();
                if item.id == stale_waiting {
                    item.id = fresh_waiting.clone();
                }
            }
        }
        if let Some(turn) = self.active_turn.as_mut() {
            if turn.turn_id == *provisional {
                turn.turn_id = real;
            }
        }
        self.rebuild_index();
        self
    }

    /// Replace the active-turn cursor wholesale.
    pub fn with_active_turn(mut self, turn: Option<ActiveTurn>) -> Self {
        self.active_turn = turn;
        self
    }

    /// Adjust the cursor in place; no-op when no turn has started.
    pub fn map_active_turn(mut self, f: impl FnOnce(&mut ActiveTurn)) -> Self {
        if let Some(turn) = self.active_turn.as_mut() {
            f(turn);
        }
        self
    }

    /// Empty state for an explicit new-conversation.
    pub fn reset(self) -> Self {
        Self::new()
    }

    fn rebuild_index(&mut self) {
        self.index_by_id.clear();
        for (i, item) in self.timeline.iter().enumerate() {
            self.index_by_id.insert(item.id.clone(), i);
        }
        debug_assert!(self.index_is_consistent());
    }
}
