//! # Collision mirroring
//!
//! A visual flagged with `attach_collisions` owns a sibling collision
//! container whose mesh/group descendants shadow the visual's own, one for
//! one, tagged with `mirror.source_id`. This pass creates, updates, reorders
//! and prunes those shadows so the pairing always matches the visual side.

use crate::post_effects::PostEffect;
use crate::tree::{self, Placement};
use armature_scene::kinematics::ancestor_of_kind;
use armature_scene::{Document, MirrorRef, Node, NodeId, NodeKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Keeps collision containers in lockstep with their flagged visuals
#[derive(Debug, Default)]
pub struct MirrorCollisions;

impl PostEffect for MirrorCollisions {
    fn name(&self) -> &'static str {
        "mirror-collisions"
    }

    fn apply(&self, doc: &Arc<Document>) -> Arc<Document> {
        let mut pass = MirrorPass {
            doc: Document::clone(doc),
            claimed: HashSet::new(),
            changed: false,
        };
        pass.run();
        if pass.changed {
            Arc::new(pass.doc)
        } else {
            Arc::clone(doc)
        }
    }
}

struct MirrorPass {
    doc: Document,
    /// Mirror-tagged nodes confirmed by this pass
    claimed: HashSet<NodeId>,
    changed: bool,
}

impl MirrorPass {
    fn run(&mut self) {
        let visuals: Vec<NodeId> = self
            .pre_order()
            .into_iter()
            .filter(|id| self.doc.node(id).is_some_and(Node::attaches_collisions))
            .collect();

        for visual in visuals {
            if self.doc.node(&visual).is_some_and(Node::attaches_collisions) {
                self.sync_visual(&visual);
            }
        }

        self.release_unclaimed();
    }

    fn pre_order(&self) -> Vec<NodeId> {
        self.doc
            .roots()
            .iter()
            .flat_map(|root| self.doc.subtree_ids(root))
            .collect()
    }

    fn sync_visual(&mut self, visual: &NodeId) {
        let Some(collision) = self.pair_collision(visual) else {
            return;
        };
        self.claimed.insert(collision.clone());

        let transform = self.doc.node(visual).and_then(|node| node.components.transform);
        let expected = Some(MirrorRef {
            source_id: visual.clone(),
        });
        let stale = self
            .doc
            .node(&collision)
            .is_some_and(|node| {
                node.components.mirror != expected || node.components.transform != transform
            });
        if stale {
            if let Some(node) = tree::node_mut(&mut self.doc, &collision) {
                node.components.mirror = expected;
                node.components.transform = transform;
            }
            self.changed = true;
        }

        let mut index = HashMap::new();
        for member in self.doc.subtree_ids(&collision).into_iter().skip(1) {
            if let Some(source) = self.doc.node(&member).and_then(Node::mirror_source) {
                index.entry(source.clone()).or_insert(member);
            }
        }

        self.mirror_children(visual, &collision, &mut index);
    }

    /// Find (or create) the collision container paired with `visual`
    fn pair_collision(&mut self, visual: &NodeId) -> Option<NodeId> {
        let parent = self.doc.node(visual)?.parent_id.clone();
        let siblings: Vec<NodeId> = match &parent {
            Some(parent) => self.doc.children(parent).to_vec(),
            None => self.doc.roots().to_vec(),
        };
        let visual_subtree: HashSet<NodeId> = self.doc.subtree_ids(visual).into_iter().collect();

        let tagged = siblings.iter().find(|id| {
            self.is_available(id, visual)
                && self.doc.node(id).and_then(Node::mirror_source) == Some(visual)
        });
        if let Some(found) = tagged {
            return Some(found.clone());
        }

        let adopted = siblings
            .iter()
            .find(|id| self.is_available(id, visual) && self.holds_shadows_of(id, &visual_subtree));
        if let Some(found) = adopted {
            return Some(found.clone());
        }

        let elsewhere = self
            .pre_order()
            .into_iter()
            .filter(|id| !visual_subtree.contains(id) && !self.doc.is_self_or_ancestor(id, visual))
            .find(|id| self.is_available(id, visual) && self.holds_shadows_of(id, &visual_subtree));
        if let Some(found) = elsewhere {
            debug!(
                collision_id = %found,
                visual_id = %visual,
                "Moving collision next to its visual"
            );
            tree::reparent(&mut self.doc, &found, parent.as_ref(), Placement::After(visual));
            self.changed = true;
            return Some(found);
        }

        let mut created = Node::new(NodeId::fresh(), "Collision", NodeKind::Collision);
        created.components.mirror = Some(MirrorRef {
            source_id: visual.clone(),
        });
        let id = created.id.clone();
        debug!(collision_id = %id, visual_id = %visual, "Creating mirrored collision");
        tree::insert(&mut self.doc, created, parent.as_ref(), Placement::After(visual));
        self.changed = true;
        Some(id)
    }

    /// An unclaimed collision not owned by some other live, flagged visual
    fn is_available(&self, id: &NodeId, visual: &NodeId) -> bool {
        if self.claimed.contains(id) {
            return false;
        }
        let Some(node) = self.doc.node(id) else {
            return false;
        };
        if node.kind != NodeKind::Collision {
            return false;
        }
        match node.mirror_source() {
            None => true,
            Some(source) if source == visual => true,
            Some(source) => !self.doc.node(source).is_some_and(Node::attaches_collisions),
        }
    }

    fn holds_shadows_of(&self, collision: &NodeId, visual_subtree: &HashSet<NodeId>) -> bool {
        self.doc.subtree_ids(collision).iter().skip(1).any(|member| {
            self.doc
                .node(member)
                .and_then(Node::mirror_source)
                .is_some_and(|source| visual_subtree.contains(source))
        })
    }

    fn mirror_children(
        &mut self,
        source_parent: &NodeId,
        shadow_parent: &NodeId,
        index: &mut HashMap<NodeId, NodeId>,
    ) {
        let sources: Vec<NodeId> = self
            .doc
            .children(source_parent)
            .iter()
            .filter(|id| self.doc.node(id).is_some_and(|node| node.kind.is_mirrorable()))
            .cloned()
            .collect();

        let mut ordered = Vec::with_capacity(sources.len());
        for source in sources {
            let shadow = self.sync_shadow(&source, shadow_parent, index);
            ordered.push(shadow.clone());
            self.mirror_children(&source, &shadow, index);
        }

        let current = self.doc.children(shadow_parent).to_vec();
        let mut arranged = ordered.clone();
        arranged.extend(current.iter().filter(|id| !ordered.contains(id)).cloned());
        if arranged != current {
            if let Some(node) = tree::node_mut(&mut self.doc, shadow_parent) {
                node.children = arranged;
            }
            self.changed = true;
        }
    }

    /// Reuse or create the shadow of `source` directly under `shadow_parent`
    fn sync_shadow(
        &mut self,
        source: &NodeId,
        shadow_parent: &NodeId,
        index: &mut HashMap<NodeId, NodeId>,
    ) -> NodeId {
        let reusable = index
            .remove(source)
            .filter(|shadow| !self.claimed.contains(shadow))
            .filter(|shadow| !self.doc.is_self_or_ancestor(shadow, shadow_parent));

        let shadow = match reusable {
            Some(shadow) => {
                let misplaced = self
                    .doc
                    .node(&shadow)
                    .is_some_and(|node| node.parent_id.as_ref() != Some(shadow_parent));
                if misplaced {
                    tree::reparent(&mut self.doc, &shadow, Some(shadow_parent), Placement::End);
                    self.changed = true;
                }
                shadow
            }
            None => {
                let id = NodeId::fresh();
                let mut created = Node::new(id.clone(), "", NodeKind::Group);
                created.components.mirror = Some(MirrorRef {
                    source_id: source.clone(),
                });
                tree::insert(&mut self.doc, created, Some(shadow_parent), Placement::End);
                self.changed = true;
                id
            }
        };

        self.claimed.insert(shadow.clone());
        self.copy_from_source(source, &shadow);
        shadow
    }

    fn copy_from_source(&mut self, source: &NodeId, shadow: &NodeId) {
        let (Some(from), Some(to)) = (self.doc.node(source), self.doc.node(shadow)) else {
            return;
        };
        let expected = Some(MirrorRef {
            source_id: source.clone(),
        });
        let up_to_date = to.name == from.name
            && to.kind == from.kind
            && to.source == from.source
            && to.components.transform == from.components.transform
            && to.components.mirror == expected;
        if up_to_date {
            return;
        }

        let name = from.name.clone();
        let kind = from.kind;
        let origin = from.source.clone();
        let transform = from.components.transform;
        if let Some(node) = tree::node_mut(&mut self.doc, shadow) {
            node.name = name;
            node.kind = kind;
            node.source = origin;
            node.components.transform = transform;
            node.components.mirror = expected;
        }
        self.changed = true;
    }

    /// Prune or detach mirror tags this pass did not confirm.
    ///
    /// Stale shadows inside a live collision, and anything whose source is
    /// gone, are deleted; tags pointing at live but unpaired sources are
    /// cleared so the nodes become ordinary, user-owned geometry.
    fn release_unclaimed(&mut self) {
        let candidates: Vec<NodeId> = self
            .pre_order()
            .into_iter()
            .filter(|id| !self.claimed.contains(id))
            .filter(|id| self.doc.node(id).is_some_and(|node| node.components.mirror.is_some()))
            .collect();

        for id in candidates {
            let Some(node) = self.doc.node(&id) else {
                continue;
            };
            let Some(source) = node.mirror_source().cloned() else {
                continue;
            };
            let owner = ancestor_of_kind(&self.doc, &id, NodeKind::Collision).cloned();
            let inside_live_collision = owner
                .as_ref()
                .is_some_and(|owner| *owner != id && self.claimed.contains(owner));

            if inside_live_collision || !self.doc.contains(&source) {
                debug!(node_id = %id, source_id = %source, "Pruning stale mirror");
                tree::remove(&mut self.doc, &id);
            } else {
                self.detach_tag(&id);
            }
            self.changed = true;
        }
    }

    /// Clear the tag; the node rejoins name uniqueness and may need a suffix
    fn detach_tag(&mut self, id: &NodeId) {
        let Some(mut node) = self.doc.node(id).cloned() else {
            return;
        };
        node.components.mirror = None;
        let desired = node.name.clone();
        node.name = tree::resolve_name(&self.doc, &node, &desired, Some(id));
        self.doc.scene.nodes.insert(id.clone(), Arc::new(node));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutations::{add_node, remove_subtree, set_node_visual};
    use armature_scene::{Geometry, NodeInput, NodeSource, Transform, VisualFlags};

    fn link_with_visual() -> Arc<Document> {
        let doc = Arc::new(Document::new());
        let doc = add_node(&doc, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
        let doc = add_node(
            &doc,
            NodeInput::new(NodeKind::Link, "Link").with_id("link").under("robot"),
        );
        let doc = add_node(
            &doc,
            NodeInput::new(NodeKind::Visual, "Visual")
                .with_id("vis")
                .under("link")
                .attaching_collisions(),
        );
        add_node(
            &doc,
            NodeInput::new(NodeKind::Mesh, "Wheel")
                .with_id("wheel")
                .under("vis")
                .with_transform(Transform::from_position([0.0, 0.0, 0.2]))
                .with_source(NodeSource::Primitive {
                    shape: Geometry::Cylinder {
                        radius: 0.1,
                        length: 0.05,
                    },
                }),
        )
    }

    fn collision_of(doc: &Document, link: &str) -> NodeId {
        doc.children(&NodeId::new(link))
            .iter()
            .find(|id| doc.node(id).is_some_and(|n| n.kind == NodeKind::Collision))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_creates_collision_after_visual() {
        let doc = MirrorCollisions.apply(&link_with_visual());
        let children = doc.children(&NodeId::new("link"));
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], NodeId::new("vis"));

        let collision = doc.node(&children[1]).unwrap();
        assert_eq!(collision.name, "Collision");
        assert_eq!(collision.mirror_source(), Some(&NodeId::new("vis")));

        let shadow = doc.node(&collision.children[0]).unwrap();
        assert_eq!(shadow.name, "Wheel");
        assert_eq!(shadow.kind, NodeKind::Mesh);
        assert_eq!(shadow.mirror_source(), Some(&NodeId::new("wheel")));
        assert_eq!(shadow.transform().position, [0.0, 0.0, 0.2]);
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn test_second_run_is_identity() {
        let once = MirrorCollisions.apply(&link_with_visual());
        let twice = MirrorCollisions.apply(&once);
        assert!(Arc::ptr_eq(&once, &twice));
    }

    #[test]
    fn test_removing_source_prunes_shadow() {
        let doc = MirrorCollisions.apply(&link_with_visual());
        let collision = collision_of(&doc, "link");
        let doc = MirrorCollisions.apply(&remove_subtree(&doc, &NodeId::new("wheel")));
        assert!(doc.children(&collision).is_empty());
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn test_removing_visual_prunes_collision() {
        let doc = MirrorCollisions.apply(&link_with_visual());
        let doc = MirrorCollisions.apply(&remove_subtree(&doc, &NodeId::new("vis")));
        assert!(doc.children(&NodeId::new("link")).is_empty());
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_unflagging_detaches_shadows() {
        let doc = MirrorCollisions.apply(&link_with_visual());
        let collision = collision_of(&doc, "link");
        let off = Some(VisualFlags {
            attach_collisions: false,
        });
        let doc = MirrorCollisions.apply(&set_node_visual(&doc, &NodeId::new("vis"), off));

        let kept = doc.node(&collision).unwrap();
        assert!(kept.components.mirror.is_none());
        let shadow = doc.node(&kept.children[0]).unwrap();
        assert!(shadow.components.mirror.is_none());
        assert_eq!(shadow.name, "Wheel_1");
        assert!(doc.check_invariants().is_empty());
    }

    #[test]
    fn test_user_nodes_under_collision_stay_after_shadows() {
        let doc = MirrorCollisions.apply(&link_with_visual());
        let collision = collision_of(&doc, "link");
        let doc = add_node(
            &doc,
            NodeInput::new(NodeKind::Mesh, "Bumper").with_id("bumper").under(collision.as_str()),
        );
        let doc = add_node(
            &doc,
            NodeInput::new(NodeKind::Mesh, "Hub").with_id("hub").under("vis"),
        );
        let doc = MirrorCollisions.apply(&doc);

        let names: Vec<_> = doc
            .children(&collision)
            .iter()
            .map(|id| doc.node(id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["Wheel", "Hub", "Bumper"]);
    }
}
