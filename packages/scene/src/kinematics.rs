//! # Kinematic chain resolver
//!
//! The physical tree nests wrapper nodes (visual, collision, group, mesh)
//! between links and the joints above and below them, so joint-to-link
//! relationships are recovered by bounded search rather than read off
//! direct edges. Every query here is read-only.

use crate::document::Document;
use crate::id::NodeId;
use crate::node::{Node, NodeKind};
use std::collections::HashSet;

/// The label a link is known by in robot-description text
pub fn resolve_link_label(node: &Node) -> &str {
    match node.link_fragment() {
        Some(fragment) if !fragment.name.is_empty() => &fragment.name,
        _ => &node.name,
    }
}

/// First node of `kind` on the parent chain, starting at `start` itself
pub fn ancestor_of_kind<'a>(
    doc: &'a Document,
    start: &NodeId,
    kind: NodeKind,
) -> Option<&'a NodeId> {
    let mut visited = HashSet::new();
    let mut current = doc.node(start);
    while let Some(node) = current {
        if node.kind == kind {
            return Some(&node.id);
        }
        if !visited.insert(&node.id) {
            return None;
        }
        current = node.parent_id.as_ref().and_then(|parent| doc.node(parent));
    }
    None
}

/// Nearest link above a joint, skipping wrapper nodes
pub fn joint_parent_link_id<'a>(doc: &'a Document, joint_id: &NodeId) -> Option<&'a NodeId> {
    let joint = doc.node(joint_id)?;
    let parent = joint.parent_id.as_ref()?;
    ancestor_of_kind(doc, parent, NodeKind::Link)
}

/// Links reached below a joint: at most one per branch, never crossing a
/// nested joint or descending past the first link found.
pub fn joint_child_link_ids(doc: &Document, joint_id: &NodeId) -> Vec<NodeId> {
    let mut found: Vec<NodeId> = Vec::new();
    let Some(joint) = doc.node(joint_id) else {
        return found;
    };

    let mut visited = HashSet::new();
    for branch in &joint.children {
        let mut stack = vec![branch];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = doc.node(id) else {
                continue;
            };
            match node.kind {
                NodeKind::Link => {
                    if !found.contains(&node.id) {
                        found.push(node.id.clone());
                    }
                    break;
                }
                NodeKind::Joint => {}
                _ => stack.extend(node.children.iter().rev()),
            }
        }
    }
    found
}

/// Label of the joint's parent link, if it resolves
pub fn joint_parent_label<'a>(doc: &'a Document, joint_id: &NodeId) -> Option<&'a str> {
    joint_parent_link_id(doc, joint_id)
        .and_then(|id| doc.node(id))
        .map(resolve_link_label)
}

/// Label of the joint's first child link, if any
pub fn joint_child_label<'a>(doc: &'a Document, joint_id: &NodeId) -> Option<&'a str> {
    joint_child_link_ids(doc, joint_id)
        .first()
        .and_then(|id| doc.node(id))
        .map(resolve_link_label)
}
