//! # Post-Effect System
//!
//! Accepted commands trigger follow-up passes that keep derived structure
//! consistent with what the user edited.
//!
//! ## Design
//!
//! After a command changes the document, the engine runs every registered
//! effect in order:
//! - `MirrorCollisions`: collision containers follow their flagged visuals
//! - `RelabelJoints`: joint fragments follow the live kinematic structure
//!
//! Post-effects are:
//! - **Deterministic**: Same document always produces the same result
//! - **Idempotent**: Running the engine on its own output changes nothing
//! - **Minimal**: An effect with nothing to do returns its input `Arc`

use crate::mirror::MirrorCollisions;
use crate::tree;
use armature_scene::kinematics::{joint_child_label, joint_parent_label};
use armature_scene::{Document, NodeId, NodeKind, RobotFragment};
use std::sync::Arc;
use tracing::{debug, trace};

/// A whole-document consistency pass
pub trait PostEffect: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Return the input `Arc` when nothing needed fixing
    fn apply(&self, doc: &Arc<Document>) -> Arc<Document>;
}

/// Re-derive joint `parent`/`child` labels from the tree
#[derive(Debug, Default)]
pub struct RelabelJoints;

impl PostEffect for RelabelJoints {
    fn name(&self) -> &'static str {
        "relabel-joints"
    }

    fn apply(&self, doc: &Arc<Document>) -> Arc<Document> {
        let drifted: Vec<(NodeId, Option<String>, Option<String>)> = doc
            .nodes()
            .filter(|node| node.kind == NodeKind::Joint)
            .filter_map(|node| {
                let fragment = node.joint_fragment()?;
                let parent =
                    joint_parent_label(doc, &node.id).filter(|label| *label != fragment.parent);
                let child =
                    joint_child_label(doc, &node.id).filter(|label| *label != fragment.child);
                if parent.is_none() && child.is_none() {
                    return None;
                }
                Some((node.id.clone(), parent.map(str::to_string), child.map(str::to_string)))
            })
            .collect();

        if drifted.is_empty() {
            return Arc::clone(doc);
        }

        let mut next = Document::clone(doc);
        for (id, parent, child) in drifted {
            debug!(joint_id = %id, parent = ?parent, child = ?child, "Relabelling joint");
            if let Some(RobotFragment::Joint(joint)) = tree::node_mut(&mut next, &id)
                .and_then(|node| node.components.robot_fragment.as_mut())
            {
                if let Some(parent) = parent {
                    joint.parent = parent;
                }
                if let Some(child) = child {
                    joint.child = child;
                }
            }
        }
        Arc::new(next)
    }
}

/// Post-effect engine that applies all registered effects
#[derive(Debug)]
pub struct PostEffectEngine {
    effects: Vec<Box<dyn PostEffect>>,
}

impl PostEffectEngine {
    /// Create engine with default effects
    pub fn new() -> Self {
        Self {
            effects: vec![Box::new(MirrorCollisions), Box::new(RelabelJoints)],
        }
    }

    /// Engine with no effects registered
    pub fn empty() -> Self {
        Self { effects: Vec::new() }
    }

    pub fn with_effect(mut self, effect: impl PostEffect + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    /// Run every effect in registration order
    pub fn run(&self, doc: &Arc<Document>) -> Arc<Document> {
        let mut current = Arc::clone(doc);
        for effect in &self.effects {
            let next = effect.apply(&current);
            if !Arc::ptr_eq(&next, &current) {
                trace!(effect = effect.name(), "Post-effect changed document");
            }
            current = next;
        }
        current
    }
}

impl Default for PostEffectEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Bring a document to its synchronized form with the default effects
pub fn synchronize(doc: &Arc<Document>) -> Arc<Document> {
    PostEffectEngine::new().run(doc)
}
