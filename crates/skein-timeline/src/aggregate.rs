//! Delta aggregation inside one model-call cluster.
//!
//! Streams arrive as word-level fragments. These rules coalesce them into
//! at most a handful of sub-items so a renderer never sees one item per
//! token. Two invariants hold for every reachable cluster:
//!
//! - at most one sub-item is open (accepting deltas) at any time;
//! - reasoning sub-items never appear after the first content sub-item.

use skein_types::{ItemId, ModelCallItem, SubItem};

/// Fold a reasoning delta into the cluster.
///
/// Appends to the last reasoning sub-item while it is still open, otherwise
/// opens a new one. Once content has started in this cluster the reasoning
/// phase is over; a late reasoning delta is dropped (trace-logged) rather
/// than allowed to break the ordering invariant.
pub fn push_reasoning(cluster_id: &ItemId, call: &mut ModelCallItem, delta: &str) {
    if call.has_content() {
        tracing::trace!(
            cluster = %cluster_id,
            "reasoning delta after content started, dropping"
        );
        return;
    }
    match call.children.iter_mut().rev().find(|c| c.is_reasoning()) {
        Some(last) if last.is_open() => last.push_text(delta),
        _ => {
            let ordinal = call.children.len();
            call.push_child(SubItem::open_reasoning(cluster_id, ordinal, delta));
        }
    }
}

/// Fold a content delta into the cluster.
///
/// Reasoning and content never stream concurrently, so the first content
/// delta closes any open reasoning sub-item. The delta then appends to the
/// last content sub-item while it is still open, otherwise opens a new one.
pub fn push_content(cluster_id: &ItemId, call: &mut ModelCallItem, delta: &str) {
    if let Some(open) = call.open_child_mut() {
        if open.is_reasoning() {
            open.close();
        }
    }
    match call.children.iter_mut().rev().find(|c| c.is_content()) {
        Some(last) if last.is_open() => last.push_text(delta),
        _ => {
            let ordinal = call.children.len();
            call.push_child(SubItem::open_content(cluster_id, ordinal, delta));
        }
    }
}
