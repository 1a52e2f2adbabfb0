//! # Tree Mutations
//!
//! Structural operations on scene documents.
//!
//! ## Design Principles
//!
//! 1. **Pure**: every operation maps `(&Arc<Document>, intent)` to a new document
//! 2. **Total**: invalid targets return the input `Arc` unchanged, never an error
//! 3. **Invariant-preserving**: parent/children duality, kind constraints and
//!    name uniqueness hold on every returned document
//!
//! ## Mutation Semantics
//!
//! ### SetParent
//! - Robots never move
//! - Links may only sit under robots or joints; other targets fall back to root
//! - Moves that would create a cycle are no-ops
//!
//! ### SetName
//! - Names are made unique document-wide (`Link`, `Link_1`, ...)
//! - Renaming a link rewrites joint fragments that referenced its old label
//!
//! ### Paste / Duplicate
//! - Every pasted ID is fresh; references inside the payload are remapped
//! - References leaving the payload are kept as provenance

use crate::tree::{self, AttachWinner, Placement};
use armature_scene::kinematics::{ancestor_of_kind, resolve_link_label};
use armature_scene::{
    Document, MirrorRef, Node, NodeId, NodeInput, NodeKind, NodeSource, Physics, PhysicsFields,
    RobotFragment, Transform, VisualFlags,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Serializable editing intents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Mutation {
    AddNode {
        node: NodeInput,
    },

    /// Insert several nodes; parents may reference nodes from the same batch
    AddNodes {
        nodes: Vec<NodeInput>,
    },

    SetName {
        node_id: NodeId,
        name: String,
    },

    SetTransform {
        node_id: NodeId,
        transform: Option<Transform>,
    },

    SetPhysics {
        node_id: NodeId,
        physics: Option<Physics>,
        #[serde(default)]
        fields: PhysicsFields,
    },

    SetVisual {
        node_id: NodeId,
        flags: Option<VisualFlags>,
    },

    SetRobotFragment {
        node_id: NodeId,
        fragment: Option<RobotFragment>,
    },

    SetParent {
        node_id: NodeId,
        parent_id: Option<NodeId>,
    },

    /// Copy a subtree next to the original
    Duplicate {
        node_id: NodeId,
        #[serde(default)]
        offset: [f64; 3],
    },

    Paste {
        payload: SubtreePayload,
        #[serde(default)]
        options: PasteOptions,
    },

    /// Delete a node and all its descendants
    Remove {
        node_id: NodeId,
    },

    Select {
        node_id: Option<NodeId>,
    },
}

impl Mutation {
    /// Apply to a document snapshot; returns the same `Arc` when nothing changed
    pub fn apply(&self, doc: &Arc<Document>) -> Arc<Document> {
        match self {
            Mutation::AddNode { node } => add_node(doc, node.clone()),
            Mutation::AddNodes { nodes } => add_nodes(doc, nodes.clone()),
            Mutation::SetName { node_id, name } => set_node_name(doc, node_id, name),
            Mutation::SetTransform { node_id, transform } => {
                set_node_transform(doc, node_id, *transform)
            }
            Mutation::SetPhysics {
                node_id,
                physics,
                fields,
            } => set_node_physics(doc, node_id, *physics, *fields),
            Mutation::SetVisual { node_id, flags } => set_node_visual(doc, node_id, *flags),
            Mutation::SetRobotFragment { node_id, fragment } => {
                set_node_robot_fragment(doc, node_id, fragment.clone())
            }
            Mutation::SetParent { node_id, parent_id } => {
                set_node_parent(doc, node_id, parent_id.as_ref())
            }
            Mutation::Duplicate { node_id, offset } => clone_subtree(doc, node_id, *offset).0,
            Mutation::Paste { payload, options } => paste_subtree(doc, payload, options).0,
            Mutation::Remove { node_id } => remove_subtree(doc, node_id),
            Mutation::Select { node_id } => select(doc, node_id.as_ref()),
        }
    }

    /// Human-readable label for history entries
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::AddNode { .. } => "Add node",
            Mutation::AddNodes { .. } => "Add nodes",
            Mutation::SetName { .. } => "Rename",
            Mutation::SetTransform { .. } => "Transform",
            Mutation::SetPhysics { .. } => "Edit physics",
            Mutation::SetVisual { .. } => "Edit visual",
            Mutation::SetRobotFragment { .. } => "Edit robot data",
            Mutation::SetParent { .. } => "Move",
            Mutation::Duplicate { .. } => "Duplicate",
            Mutation::Paste { .. } => "Paste",
            Mutation::Remove { .. } => "Delete",
            Mutation::Select { .. } => "Select",
        }
    }
}

/// Clipboard / duplicate payload: a node and its descendants, pre-order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtreePayload {
    pub root_id: NodeId,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasteOptions {
    /// Added to the pasted root's translation
    #[serde(default)]
    pub offset: [f64; 3],
    /// Appended to the pasted root's name; `None` keeps the name as copied
    #[serde(default = "default_paste_suffix")]
    pub name_suffix: Option<String>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    /// Insert right after this sibling instead of at the end
    #[serde(default)]
    pub insert_after_id: Option<NodeId>,
}

impl Default for PasteOptions {
    fn default() -> Self {
        Self {
            offset: [0.0; 3],
            name_suffix: default_paste_suffix(),
            parent_id: None,
            insert_after_id: None,
        }
    }
}

fn default_paste_suffix() -> Option<String> {
    Some(" Paste".to_string())
}

pub fn add_node(doc: &Arc<Document>, input: NodeInput) -> Arc<Document> {
    add_nodes(doc, vec![input])
}

/// Insert a batch of nodes.
///
/// Nodes are created first and wired to their parents afterwards, in input
/// order, so entries may reference siblings created in the same batch.
pub fn add_nodes(doc: &Arc<Document>, inputs: Vec<NodeInput>) -> Arc<Document> {
    let mut next = Document::clone(doc);
    let mut pending = Vec::with_capacity(inputs.len());

    for input in inputs {
        let id = input.id.unwrap_or_else(NodeId::fresh);
        if next.contains(&id) {
            debug!(node_id = %id, "Skipping node with an ID already in use");
            continue;
        }

        let mut node = Node::new(id.clone(), String::new(), input.kind);
        node.components = input.components;
        node.source = input.source;
        node.name = tree::resolve_name(&next, &node, &input.name, None);
        stamp_fragment_name(&mut node, &input.name);

        tree::insert(&mut next, node, None, Placement::End);
        pending.push((id, input.parent_id));
    }

    if pending.is_empty() {
        return Arc::clone(doc);
    }

    for (id, requested) in &pending {
        if let Some(parent) = sanitize_parent(&next, id, requested.as_ref()) {
            tree::reparent(&mut next, id, Some(&parent), Placement::End);
        }
    }
    for (id, _) in &pending {
        tree::enforce_single_attach(&mut next, id, AttachWinner::Existing);
    }

    Arc::new(next)
}

/// The parent `id` may legally take, or `None` for the root list
fn sanitize_parent(doc: &Document, id: &NodeId, requested: Option<&NodeId>) -> Option<NodeId> {
    let node = doc.node(id)?;
    let parent = doc.node(requested?)?;
    if doc.is_self_or_ancestor(id, &parent.id) {
        return None;
    }
    if !node.kind.accepts_parent(parent.kind) {
        return None;
    }
    Some(parent.id.clone())
}

/// Keep robot-fragment names in step with the display name.
///
/// A link fragment keeps its own label unless it is empty or matched the
/// name that was asked for before uniqueness resolution.
fn stamp_fragment_name(node: &mut Node, requested: &str) {
    let name = node.name.clone();
    match (&node.kind, node.components.robot_fragment.as_mut()) {
        (NodeKind::Joint, Some(RobotFragment::Joint(joint))) => joint.name = name,
        (NodeKind::Link, Some(RobotFragment::Link(link)))
            if link.name.is_empty() || link.name == requested =>
        {
            link.name = name
        }
        _ => {}
    }
}

pub fn set_node_name(doc: &Arc<Document>, id: &NodeId, name: &str) -> Arc<Document> {
    let Some(node) = doc.node(id) else {
        return Arc::clone(doc);
    };
    if node.kind.canonical_name().is_some() || name.trim().is_empty() {
        return Arc::clone(doc);
    }

    let resolved = tree::resolve_name(doc, node, name, Some(id));
    let fragment_stale = node
        .components
        .robot_fragment
        .as_ref()
        .is_some_and(|fragment| fragment.name() != resolved);
    if resolved == node.name && !fragment_stale {
        return Arc::clone(doc);
    }

    let old_label = (node.kind == NodeKind::Link).then(|| resolve_link_label(node).to_string());
    let mut next = Document::clone(doc);

    let Some(target) = tree::node_mut(&mut next, id) else {
        return Arc::clone(doc);
    };
    target.name = resolved.clone();
    match target.components.robot_fragment.as_mut() {
        Some(RobotFragment::Link(link)) => link.name = resolved.clone(),
        Some(RobotFragment::Joint(joint)) => joint.name = resolved.clone(),
        None => {}
    }
    let new_label = resolve_link_label(target).to_string();

    if let Some(old_label) = old_label {
        if old_label != new_label {
            relabel_joint_references(&mut next, &old_label, &new_label);
        }
    }

    Arc::new(next)
}

/// Rewrite joint fragments that name `old` as their parent or child link
fn relabel_joint_references(doc: &mut Document, old: &str, new: &str) {
    let joints: Vec<NodeId> = doc
        .nodes()
        .filter(|node| {
            node.joint_fragment()
                .is_some_and(|joint| joint.parent == old || joint.child == old)
        })
        .map(|node| node.id.clone())
        .collect();

    for id in joints {
        if let Some(RobotFragment::Joint(joint)) =
            tree::node_mut(doc, &id).and_then(|node| node.components.robot_fragment.as_mut())
        {
            if joint.parent == old {
                joint.parent = new.to_string();
            }
            if joint.child == old {
                joint.child = new.to_string();
            }
        }
    }
}

/// Replace one component when the node exists and the value differs
fn replace_component<T: PartialEq>(
    doc: &Arc<Document>,
    id: &NodeId,
    value: T,
    get: impl Fn(&Node) -> &T,
    set: impl FnOnce(&mut Node, T),
) -> Arc<Document> {
    match doc.node(id) {
        Some(node) if *get(node) != value => {
            let mut next = Document::clone(doc);
            if let Some(node) = tree::node_mut(&mut next, id) {
                set(node, value);
            }
            Arc::new(next)
        }
        _ => Arc::clone(doc),
    }
}

pub fn set_node_transform(
    doc: &Arc<Document>,
    id: &NodeId,
    transform: Option<Transform>,
) -> Arc<Document> {
    replace_component(
        doc,
        id,
        transform,
        |node| &node.components.transform,
        |node, value| node.components.transform = value,
    )
}

pub fn set_node_physics(
    doc: &Arc<Document>,
    id: &NodeId,
    physics: Option<Physics>,
    fields: PhysicsFields,
) -> Arc<Document> {
    let Some(node) = doc.node(id) else {
        return Arc::clone(doc);
    };
    if node.components.physics == physics && node.components.physics_fields == fields {
        return Arc::clone(doc);
    }
    let mut next = Document::clone(doc);
    if let Some(node) = tree::node_mut(&mut next, id) {
        node.components.physics = physics;
        node.components.physics_fields = fields;
    }
    Arc::new(next)
}

/// Set visual flags; turning on attach-collisions clears it on sibling visuals
pub fn set_node_visual(
    doc: &Arc<Document>,
    id: &NodeId,
    flags: Option<VisualFlags>,
) -> Arc<Document> {
    let Some(node) = doc.node(id) else {
        return Arc::clone(doc);
    };
    if node.kind != NodeKind::Visual {
        return Arc::clone(doc);
    }

    let unchanged = node.components.visual_flags == flags;

    let mut next = Document::clone(doc);
    if let Some(node) = tree::node_mut(&mut next, id) {
        node.components.visual_flags = flags;
    }
    let cleared = tree::enforce_single_attach(&mut next, id, AttachWinner::This);
    if unchanged && !cleared {
        return Arc::clone(doc);
    }
    Arc::new(next)
}

/// Attach robot-description metadata; the fragment shape must match the kind
pub fn set_node_robot_fragment(
    doc: &Arc<Document>,
    id: &NodeId,
    fragment: Option<RobotFragment>,
) -> Arc<Document> {
    let Some(node) = doc.node(id) else {
        return Arc::clone(doc);
    };
    let compatible = match (&fragment, node.kind) {
        (None, _) => true,
        (Some(RobotFragment::Link(_)), NodeKind::Link) => true,
        (Some(RobotFragment::Joint(_)), NodeKind::Joint) => true,
        _ => false,
    };
    if !compatible {
        debug!(node_id = %id, kind = node.kind.as_str(), "Rejecting mismatched robot fragment");
        return Arc::clone(doc);
    }

    let mut candidate = node.clone();
    candidate.components.robot_fragment = fragment;
    stamp_fragment_name(&mut candidate, "");
    if candidate.components.robot_fragment == node.components.robot_fragment {
        return Arc::clone(doc);
    }

    let mut next = Document::clone(doc);
    next.scene.nodes.insert(id.clone(), Arc::new(candidate));
    Arc::new(next)
}

/// Move a node under a new parent (or to the root list)
pub fn set_node_parent(
    doc: &Arc<Document>,
    id: &NodeId,
    parent_id: Option<&NodeId>,
) -> Arc<Document> {
    let Some(node) = doc.node(id) else {
        return Arc::clone(doc);
    };
    if node.kind == NodeKind::Robot {
        return Arc::clone(doc);
    }

    let target = match parent_id {
        Some(parent_id) => {
            let Some(parent) = doc.node(parent_id) else {
                return Arc::clone(doc);
            };
            if doc.is_self_or_ancestor(id, parent_id) {
                debug!(
                    node_id = %id,
                    parent_id = %parent_id,
                    "Refusing move that would create a cycle"
                );
                return Arc::clone(doc);
            }
            node.kind.accepts_parent(parent.kind).then(|| parent_id.clone())
        }
        None => None,
    };

    if target == node.parent_id {
        return Arc::clone(doc);
    }

    let mut next = Document::clone(doc);
    tree::reparent(&mut next, id, target.as_ref(), Placement::End);
    tree::enforce_single_attach(&mut next, id, AttachWinner::Existing);
    Arc::new(next)
}

/// Snapshot of a node and all its descendants, pre-order
pub fn collect_subtree(doc: &Document, id: &NodeId) -> Option<SubtreePayload> {
    if !doc.contains(id) {
        return None;
    }
    let nodes = doc
        .subtree_ids(id)
        .iter()
        .filter_map(|member| doc.node(member).cloned())
        .collect();
    Some(SubtreePayload {
        root_id: id.clone(),
        nodes,
    })
}

/// Duplicate `id` right after itself with a `" Copy"` suffix
pub fn clone_subtree(
    doc: &Arc<Document>,
    id: &NodeId,
    offset: [f64; 3],
) -> (Arc<Document>, Option<NodeId>) {
    let Some(payload) = collect_subtree(doc, id) else {
        return (Arc::clone(doc), None);
    };
    let parent_id = doc.node(id).and_then(|node| node.parent_id.clone());
    let options = PasteOptions {
        offset,
        name_suffix: Some(" Copy".to_string()),
        parent_id,
        insert_after_id: Some(id.clone()),
    };
    paste_subtree(doc, &payload, &options)
}

/// Insert a copy of `payload` with fresh IDs; returns the new root ID
pub fn paste_subtree(
    doc: &Arc<Document>,
    payload: &SubtreePayload,
    options: &PasteOptions,
) -> (Arc<Document>, Option<NodeId>) {
    let Some(root) = payload.nodes.iter().find(|node| node.id == payload.root_id) else {
        return (Arc::clone(doc), None);
    };

    let remap: HashMap<&NodeId, NodeId> = payload
        .nodes
        .iter()
        .map(|node| (&node.id, NodeId::fresh()))
        .collect();
    let payload_parent: HashMap<&NodeId, Option<&NodeId>> = payload
        .nodes
        .iter()
        .map(|node| (&node.id, node.parent_id.as_ref()))
        .collect();

    let target_parent = paste_target(doc, root.kind, options.parent_id.as_ref());
    let mut next = Document::clone(doc);
    let mut label_remap: HashMap<String, String> = HashMap::new();

    for original in &payload.nodes {
        let is_root = original.id == payload.root_id;
        let new_id = remap[&original.id].clone();

        let mut node = Node::new(new_id.clone(), String::new(), original.kind);
        node.components = original.components.clone();
        if let Some(MirrorRef { source_id }) = node.components.mirror.as_mut() {
            if let Some(mapped) = remap.get(&*source_id) {
                *source_id = mapped.clone();
            }
        }
        node.source = Some(NodeSource::Clone {
            from: original.id.clone(),
            shape: original.source.as_ref().and_then(NodeSource::shape).cloned(),
        });
        node.children = original
            .children
            .iter()
            .filter(|child| payload_parent.get(child).copied().flatten() == Some(&original.id))
            .filter_map(|child| remap.get(child).cloned())
            .collect();

        let desired = match (&options.name_suffix, is_root) {
            (Some(suffix), true) if !original.is_name_exempt() => {
                format!("{}{}", original.name, suffix)
            }
            _ => original.name.clone(),
        };
        node.name = tree::resolve_name(&next, &node, &desired, None);

        if original.kind == NodeKind::Link {
            let old_label = resolve_link_label(original).to_string();
            if let Some(RobotFragment::Link(link)) = node.components.robot_fragment.as_mut() {
                link.name = node.name.clone();
            }
            label_remap.insert(old_label, resolve_link_label(&node).to_string());
        }
        if let Some(RobotFragment::Joint(joint)) = node.components.robot_fragment.as_mut() {
            joint.name = node.name.clone();
        }

        if is_root {
            if options.offset != [0.0; 3] {
                let mut transform = node.transform();
                for (axis, delta) in options.offset.iter().enumerate() {
                    transform.position[axis] += delta;
                }
                node.components.transform = Some(transform);
            }
            let anchor = options
                .insert_after_id
                .as_ref()
                .filter(|sibling| next.node(sibling).is_some_and(|s| s.parent_id == target_parent));
            let placement = anchor.map(Placement::After).unwrap_or(Placement::End);
            tree::insert(&mut next, node, target_parent.as_ref(), placement);
            continue;
        }

        let parent = payload_parent
            .get(&original.id)
            .copied()
            .flatten()
            .and_then(|parent| remap.get(parent));
        match parent {
            Some(parent) => {
                node.parent_id = Some(parent.clone());
                next.scene.nodes.insert(new_id, Arc::new(node));
            }
            None => tree::insert(&mut next, node, None, Placement::End),
        }
    }

    for original in payload.nodes.iter().filter(|node| node.kind == NodeKind::Joint) {
        let new_id = &remap[&original.id];
        if let Some(RobotFragment::Joint(joint)) = tree::node_mut(&mut next, new_id)
            .and_then(|node| node.components.robot_fragment.as_mut())
        {
            if let Some(label) = label_remap.get(&joint.parent) {
                joint.parent = label.clone();
            }
            if let Some(label) = label_remap.get(&joint.child) {
                joint.child = label.clone();
            }
        }
    }

    for original in &payload.nodes {
        tree::enforce_single_attach(&mut next, &remap[&original.id], AttachWinner::Existing);
    }

    let new_root = remap[&payload.root_id].clone();
    (Arc::new(next), Some(new_root))
}

/// Where a pasted root of `kind` may land given the requested parent
fn paste_target(doc: &Document, kind: NodeKind, requested: Option<&NodeId>) -> Option<NodeId> {
    let requested = requested.filter(|id| doc.contains(id))?;
    match kind {
        NodeKind::Robot => None,
        NodeKind::Link => {
            let robot = ancestor_of_kind(doc, requested, NodeKind::Robot);
            let joint = ancestor_of_kind(doc, requested, NodeKind::Joint);
            match (robot, joint) {
                (Some(robot), Some(joint)) => {
                    if doc.is_self_or_ancestor(robot, joint) {
                        Some(joint.clone())
                    } else {
                        Some(robot.clone())
                    }
                }
                (Some(found), None) | (None, Some(found)) => Some(found.clone()),
                (None, None) => None,
            }
        }
        _ => Some(requested.clone()),
    }
}

/// Delete a node and its descendants
pub fn remove_subtree(doc: &Arc<Document>, id: &NodeId) -> Arc<Document> {
    if !doc.contains(id) {
        return Arc::clone(doc);
    }
    let mut next = Document::clone(doc);
    let removed = tree::remove(&mut next, id);
    debug!(node_id = %id, removed = removed.len(), "Removed subtree");
    Arc::new(next)
}

pub fn select(doc: &Arc<Document>, id: Option<&NodeId>) -> Arc<Document> {
    if doc.scene.selected_id.as_ref() == id {
        return Arc::clone(doc);
    }
    if id.is_some_and(|id| !doc.contains(id)) {
        return Arc::clone(doc);
    }
    let mut next = Document::clone(doc);
    next.scene.selected_id = id.cloned();
    Arc::new(next)
}
