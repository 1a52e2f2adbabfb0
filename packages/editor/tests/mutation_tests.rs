//! Tests for tree mutations
//!
//! This tests:
//! - Name uniqueness and canonical container names
//! - Clone/paste isolation and reference remapping
//! - Rename hook vs structural joint relabeling, in both orders
//! - One attach-collisions flag per sibling group on every insert path

use armature_editor::{
    add_node, clone_subtree, collect_subtree, paste_subtree, set_node_name, set_node_parent,
    set_node_transform, synchronize, Mutation, PasteOptions,
};
use armature_scene::{
    Document, JointFragment, JointType, LinkFragment, NodeId, NodeInput, NodeKind, RobotFragment,
    Transform,
};
use std::sync::Arc;

fn id(value: &str) -> NodeId {
    NodeId::new(value)
}

/// Robot > Base > Elbow(joint) > Arm, with a fragment on the joint
fn arm() -> Arc<Document> {
    let doc = Arc::new(Document::new());
    let doc = add_node(&doc, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    let doc = add_node(
        &doc,
        NodeInput::new(NodeKind::Link, "Base")
            .with_id("base")
            .under("robot")
            .with_fragment(RobotFragment::Link(LinkFragment::named("Base"))),
    );
    let doc = add_node(
        &doc,
        NodeInput::new(NodeKind::Joint, "Elbow")
            .with_id("elbow")
            .under("base")
            .with_fragment(RobotFragment::Joint(
                JointFragment::new("Elbow", JointType::Revolute).between("Base", "Arm"),
            )),
    );
    add_node(&doc, NodeInput::new(NodeKind::Link, "Arm").with_id("arm").under("elbow"))
}

#[test]
fn test_second_link_named_link_becomes_link_1() {
    let doc = Arc::new(Document::new());
    let mut doc = add_node(&doc, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    for link in ["first", "second", "third"] {
        doc = add_node(&doc, NodeInput::new(NodeKind::Link, "Link").with_id(link).under("robot"));
    }

    assert_eq!(doc.node(&id("first")).unwrap().name, "Link");
    assert_eq!(doc.node(&id("second")).unwrap().name, "Link_1");
    assert_eq!(doc.node(&id("third")).unwrap().name, "Link_2");

    // renaming onto a taken name picks the next free index
    let doc = set_node_name(&doc, &id("first"), "Link_1");
    assert_eq!(doc.node(&id("first")).unwrap().name, "Link_3");
    assert!(doc.check_invariants().is_empty());
}

#[test]
fn test_visual_containers_keep_canonical_names() {
    let doc = arm();
    let doc = add_node(&doc, NodeInput::new(NodeKind::Visual, "Shell").with_id("v1").under("base"));
    let doc = add_node(&doc, NodeInput::new(NodeKind::Visual, "Shell").with_id("v2").under("arm"));
    assert_eq!(doc.node(&id("v1")).unwrap().name, "Visual");
    assert_eq!(doc.node(&id("v2")).unwrap().name, "Visual");
    assert!(doc.check_invariants().is_empty());
}

#[test]
fn test_clone_is_isolated_from_original() {
    let doc = arm();
    let (doc, copy) = clone_subtree(&doc, &id("base"), [0.0, 1.0, 0.0]);
    let copy = copy.unwrap();
    assert!(doc.check_invariants().is_empty());

    let copied_ids = doc.subtree_ids(&copy);
    let original_ids = doc.subtree_ids(&id("base"));
    assert_eq!(copied_ids.len(), original_ids.len());
    assert!(copied_ids.iter().all(|c| !original_ids.contains(c)));

    // editing the copy leaves the original alone
    let copy_arm = copied_ids
        .iter()
        .find(|c| doc.node(c).unwrap().kind == NodeKind::Link && **c != copy)
        .unwrap()
        .clone();
    let far = Some(Transform::from_position([9.0, 9.0, 9.0]));
    let edited = set_node_transform(&doc, &copy_arm, far);
    assert_eq!(edited.node(&id("arm")).unwrap().components.transform, None);
    assert!(Arc::ptr_eq(
        &doc.scene.nodes[&id("arm")],
        &edited.scene.nodes[&id("arm")]
    ));
}

#[test]
fn test_clone_remaps_joint_labels_inside_payload() {
    let doc = arm();
    let (doc, copy) = clone_subtree(&doc, &id("base"), [0.0; 3]);
    let copy = copy.unwrap();

    let copied_joint = doc
        .subtree_ids(&copy)
        .into_iter()
        .find(|c| doc.node(c).unwrap().kind == NodeKind::Joint)
        .unwrap();
    let fragment = doc.node(&copied_joint).unwrap().joint_fragment().unwrap().clone();
    assert_eq!(fragment.parent, "Base Copy");
    assert_eq!(fragment.child, "Arm_1");
    assert_eq!(fragment.name, doc.node(&copied_joint).unwrap().name);
    assert_eq!(fragment.name, "Elbow_1");

    // original untouched
    let original = doc.node(&id("elbow")).unwrap().joint_fragment().unwrap();
    assert_eq!(original.parent, "Base");
    assert_eq!(original.child, "Arm");

    // synchronizing agrees with the remapped labels
    let synced = synchronize(&doc);
    assert_eq!(
        synced.node(&copied_joint).unwrap().joint_fragment().unwrap(),
        &fragment
    );
}

#[test]
fn test_paste_external_mirror_reference_is_kept() {
    let doc = arm();
    let loose = NodeInput::new(NodeKind::Group, "Loose").with_id("loose").under("arm");
    let doc = add_node(&doc, loose);
    let mut payload = collect_subtree(&doc, &id("loose")).unwrap();
    payload.nodes[0].components.mirror = Some(armature_scene::MirrorRef {
        source_id: id("elsewhere"),
    });

    let options = PasteOptions {
        name_suffix: Some(" Paste".to_string()),
        parent_id: Some(id("arm")),
        ..PasteOptions::default()
    };
    let (doc, pasted) = paste_subtree(&doc, &payload, &options);
    let pasted = doc.node(&pasted.unwrap()).unwrap();
    assert_eq!(pasted.mirror_source(), Some(&id("elsewhere")));
    assert_eq!(pasted.parent_id, Some(id("arm")));
}

#[test]
fn test_paste_robot_is_parentless() {
    let doc = arm();
    let payload = collect_subtree(&doc, &id("robot")).unwrap();
    let options = PasteOptions {
        parent_id: Some(id("arm")),
        ..PasteOptions::default()
    };
    let (doc, pasted) = paste_subtree(&doc, &payload, &options);
    let pasted = pasted.unwrap();
    assert_eq!(doc.node(&pasted).unwrap().parent_id, None);
    assert_eq!(doc.roots().len(), 2);
    assert_eq!(doc.len(), 8);
    assert!(doc.check_invariants().is_empty());
}

#[test]
fn test_rename_then_relabel_agree() {
    // rename hook runs inside the mutation; the relabel pass then finds nothing to fix
    let doc = arm();
    let renamed = set_node_name(&doc, &id("arm"), "Forearm");
    let joint = renamed.node(&id("elbow")).unwrap().joint_fragment().unwrap();
    assert_eq!(joint.child, "Forearm");

    let synced = synchronize(&renamed);
    assert!(Arc::ptr_eq(&renamed, &synced));
}

#[test]
fn test_structure_wins_when_rename_and_move_disagree() {
    // rename Arm, then move it out from under the joint and put Hand there
    let doc = arm();
    let doc = add_node(&doc, NodeInput::new(NodeKind::Link, "Hand").with_id("hand").under("robot"));
    let doc = set_node_name(&doc, &id("arm"), "Forearm");
    let doc = set_node_parent(&doc, &id("arm"), Some(&id("robot")));
    let doc = set_node_parent(&doc, &id("hand"), Some(&id("elbow")));

    // the rename hook wrote Forearm; the tree now says Hand
    assert_eq!(doc.node(&id("elbow")).unwrap().joint_fragment().unwrap().child, "Forearm");
    let synced = synchronize(&doc);
    assert_eq!(synced.node(&id("elbow")).unwrap().joint_fragment().unwrap().child, "Hand");
}

#[test]
fn test_move_then_rename_ends_consistent() {
    // the same edits in the opposite order land on the same labels
    let doc = arm();
    let doc = add_node(&doc, NodeInput::new(NodeKind::Link, "Hand").with_id("hand").under("robot"));
    let doc = set_node_parent(&doc, &id("arm"), Some(&id("robot")));
    let doc = set_node_parent(&doc, &id("hand"), Some(&id("elbow")));
    let doc = synchronize(&doc);
    let doc = set_node_name(&doc, &id("hand"), "Gripper");

    let joint = doc.node(&id("elbow")).unwrap().joint_fragment().unwrap();
    assert_eq!(joint.child, "Gripper");
    let synced = synchronize(&doc);
    assert_eq!(synced.node(&id("elbow")).unwrap().joint_fragment().unwrap().child, "Gripper");
}

/// Base link with one flagged visual holding a box, already synchronized
fn flagged_base() -> Arc<Document> {
    let doc = arm();
    let doc = add_node(
        &doc,
        NodeInput::new(NodeKind::Visual, "Visual")
            .with_id("vis")
            .under("base")
            .attaching_collisions(),
    );
    let doc = add_node(&doc, NodeInput::new(NodeKind::Mesh, "Box").with_id("box").under("vis"));
    synchronize(&doc)
}

fn flagged_under(doc: &Document, parent: &str) -> Vec<NodeId> {
    doc.children(&id(parent))
        .iter()
        .filter(|child| doc.node(child).unwrap().attaches_collisions())
        .cloned()
        .collect()
}

fn collisions_under(doc: &Document, parent: &str) -> usize {
    doc.children(&id(parent))
        .iter()
        .filter(|child| doc.node(child).unwrap().kind == NodeKind::Collision)
        .count()
}

#[test]
fn test_duplicated_flagged_visual_leaves_one_flag() {
    let doc = flagged_base();
    assert_eq!(collisions_under(&doc, "base"), 1);

    let (doc, copy) = clone_subtree(&doc, &id("vis"), [0.0; 3]);
    let doc = synchronize(&doc);
    assert_eq!(flagged_under(&doc, "base"), vec![id("vis")]);
    assert!(!doc.node(&copy.unwrap()).unwrap().attaches_collisions());
    assert_eq!(collisions_under(&doc, "base"), 1);
    assert!(doc.check_invariants().is_empty());
}

#[test]
fn test_second_flagged_visual_added_keeps_first_flag() {
    let doc = flagged_base();
    let doc = add_node(
        &doc,
        NodeInput::new(NodeKind::Visual, "Visual")
            .with_id("late")
            .under("base")
            .attaching_collisions(),
    );
    let doc = synchronize(&doc);
    assert_eq!(flagged_under(&doc, "base"), vec![id("vis")]);
    assert_eq!(collisions_under(&doc, "base"), 1);
    assert!(doc.check_invariants().is_empty());
}

#[test]
fn test_pasted_and_moved_flagged_visuals_defer_to_existing() {
    let doc = flagged_base();
    let payload = collect_subtree(&doc, &id("vis")).unwrap();
    let options = PasteOptions {
        parent_id: Some(id("base")),
        ..PasteOptions::default()
    };
    let (pasted, _) = paste_subtree(&doc, &payload, &options);
    assert_eq!(flagged_under(&pasted, "base"), vec![id("vis")]);

    // A flagged visual moving in from another link yields as well
    let doc = add_node(
        &doc,
        NodeInput::new(NodeKind::Visual, "Visual")
            .with_id("arm-vis")
            .under("arm")
            .attaching_collisions(),
    );
    let doc = synchronize(&doc);
    assert_eq!(flagged_under(&doc, "arm"), vec![id("arm-vis")]);
    let moved = synchronize(&set_node_parent(&doc, &id("arm-vis"), Some(&id("base"))));
    assert_eq!(flagged_under(&moved, "base"), vec![id("vis")]);
    assert_eq!(collisions_under(&moved, "base"), 1);
    assert!(moved.check_invariants().is_empty());
}

#[test]
fn test_default_paste_adds_paste_suffix() {
    let doc = arm();
    let payload = collect_subtree(&doc, &id("arm")).unwrap();
    let paste = Mutation::Paste {
        payload,
        options: PasteOptions::default(),
    };
    let doc = paste.apply(&doc);
    assert!(doc.find_by_name("Arm Paste").is_some());
}
