//! # Tree surgery primitives
//!
//! Every structural edit (add, move, paste, remove, mirror upkeep) routes
//! through `attach`/`detach` so both sides of the parent/children relation
//! change together.

use armature_scene::{Document, Node, NodeId};
use std::sync::Arc;

/// Where an attached node lands among its new siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<'a> {
    End,
    After(&'a NodeId),
}

pub(crate) fn node_mut<'a>(doc: &'a mut Document, id: &NodeId) -> Option<&'a mut Node> {
    doc.scene.nodes.get_mut(id).map(Arc::make_mut)
}

/// Remove `id` from its parent's children (or the root list) and clear its
/// parent reference. The node itself stays in the document.
pub(crate) fn detach(doc: &mut Document, id: &NodeId) {
    let parent_id = match doc.node(id) {
        Some(node) => node.parent_id.clone(),
        None => return,
    };

    match parent_id {
        Some(parent_id) => {
            if let Some(parent) = node_mut(doc, &parent_id) {
                parent.children.retain(|child| child != id);
            }
        }
        None => doc.scene.roots.retain(|root| root != id),
    }

    if let Some(node) = node_mut(doc, id) {
        node.parent_id = None;
    }
}

/// Link a detached node under `parent` (or into the root list).
///
/// `Placement::After` falls back to the tail when the sibling is not found.
pub(crate) fn attach(
    doc: &mut Document,
    id: &NodeId,
    parent: Option<&NodeId>,
    placement: Placement<'_>,
) {
    if !doc.contains(id) {
        return;
    }

    let siblings = match parent {
        Some(parent_id) => match node_mut(doc, parent_id) {
            Some(parent) => &mut parent.children,
            None => return,
        },
        None => &mut doc.scene.roots,
    };

    siblings.retain(|sibling| sibling != id);
    let index = match placement {
        Placement::After(sibling) => siblings
            .iter()
            .position(|candidate| candidate == sibling)
            .map(|position| position + 1),
        Placement::End => None,
    };
    match index {
        Some(index) => siblings.insert(index, id.clone()),
        None => siblings.push(id.clone()),
    }

    if let Some(node) = node_mut(doc, id) {
        node.parent_id = parent.cloned();
    }
}

pub(crate) fn reparent(
    doc: &mut Document,
    id: &NodeId,
    parent: Option<&NodeId>,
    placement: Placement<'_>,
) {
    detach(doc, id);
    attach(doc, id, parent, placement);
}

/// Insert a brand-new node and link it in one step
pub(crate) fn insert(
    doc: &mut Document,
    mut node: Node,
    parent: Option<&NodeId>,
    placement: Placement<'_>,
) {
    let id = node.id.clone();
    node.parent_id = None;
    doc.scene.nodes.insert(id.clone(), Arc::new(node));
    doc.scene.roots.push(id.clone());
    if parent.is_some() {
        reparent(doc, &id, parent, placement);
    } else if placement != Placement::End {
        reparent(doc, &id, None, placement);
    }
}

/// Delete `id` and everything below it; returns the removed IDs
pub(crate) fn remove(doc: &mut Document, id: &NodeId) -> Vec<NodeId> {
    let removed = doc.subtree_ids(id);
    if removed.is_empty() {
        return removed;
    }
    detach(doc, id);
    for member in &removed {
        doc.scene.nodes.remove(member);
    }
    if doc
        .scene
        .selected_id
        .as_ref()
        .is_some_and(|selected| removed.contains(selected))
    {
        doc.scene.selected_id = None;
    }
    removed
}

/// Which visual keeps the attach-collisions flag when siblings compete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachWinner {
    /// The node just flagged by the user
    This,
    /// A sibling that was flagged before the node arrived
    Existing,
}

/// Leave at most one attach-collisions flag among `id` and its siblings.
///
/// Returns true when some flag was cleared.
pub(crate) fn enforce_single_attach(
    doc: &mut Document,
    id: &NodeId,
    winner: AttachWinner,
) -> bool {
    let Some(node) = doc.node(id) else {
        return false;
    };
    if !node.attaches_collisions() {
        return false;
    }
    let group = match &node.parent_id {
        Some(parent) => doc.children(parent),
        None => doc.roots(),
    };
    let mut others: Vec<NodeId> = group
        .iter()
        .filter(|sibling| *sibling != id)
        .filter(|sibling| doc.node(sibling).is_some_and(Node::attaches_collisions))
        .cloned()
        .collect();
    if others.is_empty() {
        return false;
    }

    if winner == AttachWinner::Existing {
        others[0] = id.clone();
    }
    for loser in &others {
        let flags = node_mut(doc, loser).and_then(|node| node.components.visual_flags.as_mut());
        if let Some(flags) = flags {
            flags.attach_collisions = false;
        }
    }
    true
}

/// Split a trailing `_N` index off a name
fn split_suffix(name: &str) -> (&str, Option<u64>) {
    if let Some((base, digits)) = name.rsplit_once('_') {
        if !base.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = digits.parse() {
                return (base, Some(index));
            }
        }
    }
    (name, None)
}

/// Smallest collision-free variant of `desired`.
///
/// Returns `desired` untouched when nobody else holds it; otherwise the base
/// name with `max(existing index) + 1`.
pub fn unique_name(doc: &Document, desired: &str, exclude: Option<&NodeId>) -> String {
    let taken = doc.taken_names(exclude);
    if !taken.contains(desired) {
        return desired.to_string();
    }

    let (base, _) = split_suffix(desired);
    let highest = taken
        .iter()
        .filter_map(|name| {
            if *name == base {
                return Some(0);
            }
            match split_suffix(name) {
                (candidate, Some(index)) if candidate == base => Some(index),
                _ => None,
            }
        })
        .max()
        .unwrap_or(0);

    match highest.checked_add(1) {
        Some(next) => format!("{}_{}", base, next),
        None => (1..)
            .map(|index: u64| format!("{}_{}", base, index))
            .find(|candidate| !taken.contains(candidate.as_str()))
            .unwrap_or_else(|| base.to_string()),
    }
}

/// Display name a node should carry given the requested one
pub(crate) fn resolve_name(
    doc: &Document,
    node: &Node,
    desired: &str,
    exclude: Option<&NodeId>,
) -> String {
    if let Some(canonical) = node.kind.canonical_name() {
        return canonical.to_string();
    }
    let desired = desired.trim();
    let desired = if desired.is_empty() {
        default_name(node)
    } else {
        desired.to_string()
    };
    if node.components.mirror.is_some() {
        return desired;
    }
    unique_name(doc, &desired, exclude)
}

fn default_name(node: &Node) -> String {
    let kind = node.kind.as_str();
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::from("Node"),
    }
}
