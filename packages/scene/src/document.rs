//! # Document
//!
//! The document is an immutable value. Editors produce a new `Arc<Document>`
//! for every accepted change; nodes are `Arc`-shared so generations only copy
//! what they touch.

use crate::id::NodeId;
use crate::node::{Node, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: u32,
    pub scene: Scene,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceRecord>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub nodes: BTreeMap<NodeId, Arc<Node>>,
    pub roots: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An external file the document content was imported from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub name: String,
    pub format: SourceFormat,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Urdf,
    Mesh,
    Scene,
}

impl Document {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: DOCUMENT_VERSION,
            scene: Scene::default(),
            sources: BTreeMap::new(),
            metadata: Metadata {
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.scene.nodes.get(id).map(|node| node.as_ref())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.scene.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.scene.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scene.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.scene.nodes.values().map(|node| node.as_ref())
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.scene.roots
    }

    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes().find(|node| node.name == name)
    }

    /// True when `ancestor` is `id` or lies on its parent chain
    pub fn is_self_or_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            if !visited.insert(node_id) {
                return false;
            }
            current = self.node(node_id).and_then(|node| node.parent_id.as_ref());
        }
        false
    }

    /// Pre-order IDs of `id` and all its descendants
    pub fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.node(&current) {
                stack.extend(node.children.iter().rev().cloned());
                out.push(current);
            }
        }
        out
    }

    /// Display names currently taken by name-checked nodes, ignoring `exclude`
    pub fn taken_names(&self, exclude: Option<&NodeId>) -> HashSet<&str> {
        self.nodes()
            .filter(|node| Some(&node.id) != exclude && !node.is_name_exempt())
            .map(|node| node.name.as_str())
            .collect()
    }

    /// Flat structure view consumed by rendering collaborators
    pub fn render_snapshot(&self) -> RenderSnapshot {
        let mut nodes = Vec::with_capacity(self.len());
        for root in &self.scene.roots {
            for id in self.subtree_ids(root) {
                if let Some(node) = self.node(&id) {
                    nodes.push(RenderNode {
                        id: node.id.clone(),
                        name: node.name.clone(),
                        parent_id: node.parent_id.clone(),
                        children: node.children.clone(),
                        kind: node.kind,
                    });
                }
            }
        }
        RenderSnapshot {
            nodes,
            roots: self.scene.roots.clone(),
        }
    }

    /// Every violated structural invariant; empty for a healthy document
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        self.check_adjacency(&mut violations);
        self.check_cycles(&mut violations);
        self.check_kinds(&mut violations);
        self.check_names(&mut violations);
        self.check_mirrors(&mut violations);
        self.check_attach_flags(&mut violations);
        violations
    }

    fn check_adjacency(&self, violations: &mut Vec<InvariantViolation>) {
        for node in self.nodes() {
            match &node.parent_id {
                Some(parent_id) => {
                    let count = self
                        .node(parent_id)
                        .map(|parent| parent.children.iter().filter(|c| *c == &node.id).count())
                        .unwrap_or(0);
                    if count != 1 {
                        violations.push(InvariantViolation::ParentMismatch(node.id.clone()));
                    }
                }
                None => {
                    let count = self.scene.roots.iter().filter(|r| *r == &node.id).count();
                    if count != 1 {
                        violations.push(InvariantViolation::RootMismatch(node.id.clone()));
                    }
                }
            }
            for child in &node.children {
                let linked = self
                    .node(child)
                    .map(|c| c.parent_id.as_ref() == Some(&node.id))
                    .unwrap_or(false);
                if !linked {
                    violations.push(InvariantViolation::ChildMismatch {
                        parent: node.id.clone(),
                        child: child.clone(),
                    });
                }
            }
        }
        for root in &self.scene.roots {
            let parentless = self.node(root).map(|n| n.parent_id.is_none()).unwrap_or(false);
            if !parentless {
                violations.push(InvariantViolation::RootMismatch(root.clone()));
            }
        }
    }

    fn check_cycles(&self, violations: &mut Vec<InvariantViolation>) {
        for node in self.nodes() {
            let mut seen = HashSet::new();
            let mut current = node.parent_id.as_ref();
            while let Some(id) = current {
                if id == &node.id || !seen.insert(id) {
                    violations.push(InvariantViolation::Cycle(node.id.clone()));
                    break;
                }
                current = self.node(id).and_then(|n| n.parent_id.as_ref());
            }
        }
    }

    fn check_kinds(&self, violations: &mut Vec<InvariantViolation>) {
        for node in self.nodes() {
            let Some(parent) = node.parent_id.as_ref().and_then(|p| self.node(p)) else {
                continue;
            };
            if !node.kind.accepts_parent(parent.kind) {
                violations.push(InvariantViolation::KindConstraint {
                    id: node.id.clone(),
                    kind: node.kind,
                    parent_kind: parent.kind,
                });
            }
        }
    }

    fn check_names(&self, violations: &mut Vec<InvariantViolation>) {
        let mut seen = BTreeSet::new();
        for node in self.nodes().filter(|n| !n.is_name_exempt()) {
            if !seen.insert(node.name.as_str()) {
                violations.push(InvariantViolation::DuplicateName(node.name.clone()));
            }
        }
    }

    fn check_mirrors(&self, violations: &mut Vec<InvariantViolation>) {
        for node in self.nodes() {
            let Some(source_id) = node.mirror_source() else {
                continue;
            };
            let valid = match self.mirrored_visual_for(node) {
                Some(visual) => {
                    visual.attaches_collisions() && self.is_self_or_ancestor(&visual.id, source_id)
                }
                None => false,
            };
            if !valid {
                violations.push(InvariantViolation::DanglingMirror(node.id.clone()));
            }
        }
    }

    /// At most one visual per sibling group may own a mirrored collision
    fn check_attach_flags(&self, violations: &mut Vec<InvariantViolation>) {
        let groups = std::iter::once((None, self.roots()))
            .chain(self.nodes().map(|node| (Some(&node.id), node.children.as_slice())));
        for (parent, siblings) in groups {
            let flagged = siblings
                .iter()
                .filter(|id| self.node(id).is_some_and(Node::attaches_collisions))
                .count();
            if flagged > 1 {
                violations.push(InvariantViolation::SharedAttachFlag {
                    parent: parent.cloned(),
                    flagged,
                });
            }
        }
    }

    /// The flagged visual a mirror-tagged node ultimately shadows
    fn mirrored_visual_for(&self, node: &Node) -> Option<&Node> {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if candidate.kind == NodeKind::Collision {
                return candidate.mirror_source().and_then(|id| self.node(id));
            }
            current = candidate.parent_id.as_ref().and_then(|p| self.node(p));
        }
        None
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("node {0} is not listed exactly once by its parent")]
    ParentMismatch(NodeId),

    #[error("child {child} of {parent} does not point back to it")]
    ChildMismatch { parent: NodeId, child: NodeId },

    #[error("root list and parentless nodes disagree on {0}")]
    RootMismatch(NodeId),

    #[error("node {0} is its own ancestor")]
    Cycle(NodeId),

    #[error("{kind:?} node {id} cannot sit under a {parent_kind:?}")]
    KindConstraint {
        id: NodeId,
        kind: NodeKind,
        parent_kind: NodeKind,
    },

    #[error("name {0:?} is used more than once")]
    DuplicateName(String),

    #[error("mirror node {0} has no live source")]
    DanglingMirror(NodeId),

    #[error("{flagged} sibling visuals under {parent:?} attach collisions")]
    SharedAttachFlag { parent: Option<NodeId>, flagged: usize },
}

/// Structure-only node record exchanged with the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: NodeId,
    pub name: String,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSnapshot {
    pub nodes: Vec<RenderNode>,
    pub roots: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::VisualFlags;

    fn insert(doc: &mut Document, id: &str, kind: NodeKind, parent: Option<&str>) {
        let mut node = Node::new(NodeId::new(id), id, kind);
        node.parent_id = parent.map(NodeId::new);
        if let Some(parent) = parent {
            let parent = doc.scene.nodes.get_mut(&NodeId::new(parent)).unwrap();
            Arc::make_mut(parent).children.push(NodeId::new(id));
        } else {
            doc.scene.roots.push(NodeId::new(id));
        }
        doc.scene.nodes.insert(NodeId::new(id), Arc::new(node));
    }

    #[test]
    fn test_empty_document_is_valid() {
        let doc = Document::new();
        assert!(doc.is_empty());
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn test_subtree_is_pre_order() {
        let mut doc = Document::new();
        insert(&mut doc, "robot", NodeKind::Robot, None);
        insert(&mut doc, "a", NodeKind::Link, Some("robot"));
        insert(&mut doc, "a1", NodeKind::Visual, Some("a"));
        insert(&mut doc, "b", NodeKind::Link, Some("robot"));

        let ids: Vec<_> = doc
            .subtree_ids(&NodeId::new("robot"))
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["robot", "a", "a1", "b"]);
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn test_detects_kind_and_adjacency_violations() {
        let mut doc = Document::new();
        insert(&mut doc, "link", NodeKind::Link, None);
        insert(&mut doc, "visual", NodeKind::Visual, Some("link"));
        insert(&mut doc, "inner", NodeKind::Link, Some("visual"));
        Arc::make_mut(doc.scene.nodes.get_mut(&NodeId::new("link")).unwrap())
            .children
            .push(NodeId::new("inner"));

        let violations = doc.check_invariants();
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::KindConstraint { .. })));
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::ChildMismatch { .. })));
    }

    #[test]
    fn test_detects_two_attaching_visuals_under_one_link() {
        let mut doc = Document::new();
        insert(&mut doc, "link", NodeKind::Link, None);
        insert(&mut doc, "v1", NodeKind::Visual, Some("link"));
        insert(&mut doc, "v2", NodeKind::Visual, Some("link"));
        assert!(doc.check_invariants().is_empty());

        for id in ["v1", "v2"] {
            Arc::make_mut(doc.scene.nodes.get_mut(&NodeId::new(id)).unwrap())
                .components
                .visual_flags = Some(VisualFlags { attach_collisions: true });
        }
        assert_eq!(
            doc.check_invariants(),
            vec![InvariantViolation::SharedAttachFlag {
                parent: Some(NodeId::new("link")),
                flagged: 2,
            }]
        );
    }

    #[test]
    fn test_render_snapshot_lists_every_node() {
        let mut doc = Document::new();
        insert(&mut doc, "robot", NodeKind::Robot, None);
        insert(&mut doc, "base", NodeKind::Link, Some("robot"));
        let snapshot = doc.render_snapshot();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.roots, vec![NodeId::new("robot")]);
        assert_eq!(snapshot.nodes[1].parent_id, Some(NodeId::new("robot")));
    }
}
