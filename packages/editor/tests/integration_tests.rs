//! Integration tests for the editing engine
//!
//! This tests:
//! - Commands flowing through synchronize → record → notify
//! - Collision mirroring as seen by engine users
//! - Undo/redo returning exact snapshots
//! - Robot-description import/export through the engine
//! - Config loading

use armature_editor::{
    synchronize, ChangeReason, EditorError, Engine, EngineConfig, EngineEvent, EventKind,
    ExecuteOptions, ImportOptions, Mutation, DEFAULT_CONFIG_NAME,
};
use armature_scene::{
    Geometry, NodeId, NodeInput, NodeKind, NodeSource, Pose, RobotFragment, SourceFormat,
    VisualFlags,
};
use armature_urdf::ExportOptions;
use std::sync::{Arc, Mutex};

const ARM: &str = r#"<?xml version="1.0"?>
<robot name="arm">
  <link name="base">
    <visual><geometry><box size="0.4 0.3 0.2"/></geometry></visual>
  </link>
  <link name="upper"/>
  <joint name="shoulder" type="revolute">
    <parent link="base"/>
    <child link="upper"/>
    <origin xyz="0 0 1" rpy="0 0 0"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1" upper="1" effort="10" velocity="2"/>
  </joint>
</robot>"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn add(engine: &mut Engine, node: NodeInput) -> bool {
    engine.execute(Mutation::AddNode { node }, ExecuteOptions::default())
}

fn id(value: &str) -> NodeId {
    NodeId::new(value)
}

#[test]
fn test_engine_resolves_duplicate_link_names() {
    init_tracing();
    let mut engine = Engine::default();
    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    add(&mut engine, NodeInput::new(NodeKind::Link, "Link").with_id("a").under("robot"));
    add(&mut engine, NodeInput::new(NodeKind::Link, "Link").with_id("b").under("robot"));

    let doc = engine.document();
    assert_eq!(doc.node(&id("a")).unwrap().name, "Link");
    assert_eq!(doc.node(&id("b")).unwrap().name, "Link_1");
    assert_eq!(engine.undo_label(), Some("Add node"));
}

#[test]
fn test_flagged_visual_grows_collision_shadow() {
    init_tracing();
    let mut engine = Engine::default();
    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    add(&mut engine, NodeInput::new(NodeKind::Link, "Chassis").with_id("chassis").under("robot"));
    add(&mut engine, NodeInput::new(NodeKind::Visual, "Visual").with_id("vis").under("chassis"));

    // Flag the visual, then add geometry under it
    engine.execute(
        Mutation::SetVisual {
            node_id: id("vis"),
            flags: Some(VisualFlags { attach_collisions: true }),
        },
        ExecuteOptions::default(),
    );
    add(
        &mut engine,
        NodeInput::new(NodeKind::Mesh, "Wheel")
            .with_id("wheel")
            .under("vis")
            .with_source(NodeSource::Primitive {
                shape: Geometry::Cylinder { radius: 0.2, length: 0.1 },
            }),
    );

    let doc = engine.document();
    let chassis = doc.node(&id("chassis")).unwrap();
    assert_eq!(chassis.children.len(), 2);
    assert_eq!(chassis.children[0], id("vis"));

    let collision = doc.node(&chassis.children[1]).unwrap();
    assert_eq!(collision.kind, NodeKind::Collision);
    assert_eq!(collision.name, "Collision");
    assert_eq!(collision.mirror_source(), Some(&id("vis")));

    // The shadow mirrors the mesh
    assert_eq!(collision.children.len(), 1);
    let shadow = doc.node(&collision.children[0]).unwrap();
    assert_eq!(shadow.mirror_source(), Some(&id("wheel")));
    assert_eq!(shadow.kind, NodeKind::Mesh);
    assert_eq!(shadow.name, "Wheel");
    let shape = |node_id: &NodeId| {
        let source = doc.node(node_id).unwrap().source.as_ref();
        source.and_then(NodeSource::shape).cloned()
    };
    assert_eq!(shape(&shadow.id), shape(&id("wheel")));
    assert!(doc.check_invariants().is_empty());

    // A second pass has nothing left to do
    assert!(Arc::ptr_eq(&doc, &synchronize(&doc)));

    // Deleting the mesh prunes its shadow in the same step
    engine.execute(Mutation::Remove { node_id: id("wheel") }, ExecuteOptions::default());
    let doc = engine.document();
    let collision = doc.node(&doc.node(&id("chassis")).unwrap().children[1]).unwrap();
    assert!(collision.children.is_empty());
}

#[test]
fn test_undo_redo_restore_exact_snapshots() {
    init_tracing();
    let mut engine = Engine::default();
    let mut snapshots = vec![engine.document()];

    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    snapshots.push(engine.document());
    add(&mut engine, NodeInput::new(NodeKind::Link, "Base").with_id("base").under("robot"));
    snapshots.push(engine.document());
    engine.execute(
        Mutation::SetName {
            node_id: id("base"),
            name: "Chassis".to_string(),
        },
        ExecuteOptions::default(),
    );
    snapshots.push(engine.document());
    assert_eq!(engine.undo_label(), Some("Rename"));

    // Walk all the way back
    for expected in snapshots.iter().rev().skip(1) {
        assert!(engine.undo());
        assert!(Arc::ptr_eq(&engine.document(), expected));
    }
    assert!(!engine.can_undo());
    assert!(!engine.undo());

    // And forward again
    for expected in snapshots.iter().skip(1) {
        assert!(engine.redo());
        assert!(Arc::ptr_eq(&engine.document(), expected));
    }
    assert!(!engine.can_redo());

    // A new command drops the redo branch
    engine.undo();
    add(&mut engine, NodeInput::new(NodeKind::Group, "Props").under("robot"));
    assert!(!engine.can_redo());
}

#[test]
fn test_rejected_mutation_records_nothing() {
    let mut engine = Engine::default();
    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    let before = engine.document();

    // Robots never move
    let changed = engine.execute(
        Mutation::SetParent {
            node_id: id("robot"),
            parent_id: None,
        },
        ExecuteOptions::default(),
    );
    assert!(!changed);
    assert!(Arc::ptr_eq(&before, &engine.document()));
    assert_eq!(engine.undo_label(), Some("Add node"));
}

#[test]
fn test_events_arrive_in_order() {
    init_tracing();
    let mut engine = Engine::default();
    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&log);
    engine.subscribe(EventKind::DocumentChanged, move |event, _| {
        if let EngineEvent::DocumentChanged { reason, .. } = event {
            let entry = match reason {
                ChangeReason::Command { label } => format!("doc:{}", label),
                other => format!("doc:{:?}", other),
            };
            sink.lock().unwrap().push(entry);
        }
    });
    let sink = Arc::clone(&log);
    let history = engine.subscribe(EventKind::HistoryChanged, move |event, _| {
        if let EngineEvent::HistoryChanged { can_undo, can_redo } = event {
            sink.lock().unwrap().push(format!("history:{}:{}", can_undo, can_redo));
        }
    });

    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot"));
    engine.undo();
    assert!(engine.unsubscribe(history));
    engine.redo();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "doc:Add node".to_string(),
            "history:true:false".to_string(),
            "doc:Undo".to_string(),
            "history:false:true".to_string(),
            "doc:Redo".to_string(),
        ]
    );
}

#[test]
fn test_follow_up_commands_run_after_notification() {
    let mut engine = Engine::default();
    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));

    // Select every node that gets added
    engine.subscribe(EventKind::DocumentChanged, |event, follow_ups| {
        if let EngineEvent::DocumentChanged {
            reason: ChangeReason::Command { label },
            ..
        } = event
        {
            if label == "Add node" {
                follow_ups.push_unrecorded(Mutation::Select {
                    node_id: Some(NodeId::new("base")),
                });
            }
        }
    });
    add(&mut engine, NodeInput::new(NodeKind::Link, "Base").with_id("base").under("robot"));

    assert_eq!(engine.document().scene.selected_id, Some(id("base")));
    // The selection bypassed history
    assert_eq!(engine.undo_label(), Some("Add node"));
}

#[test]
fn test_import_then_export_through_engine() {
    init_tracing();
    let mut engine = Engine::default();
    let report = engine.import_robot(ARM, ImportOptions::default()).unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let doc = engine.document();
    assert!(doc.check_invariants().is_empty());
    let robot = doc.node(&report.root_id).unwrap();
    assert_eq!(robot.kind, NodeKind::Robot);
    assert_eq!(robot.name, "arm");
    assert_eq!(engine.undo_label(), Some("Import arm"));
    let source = &doc.sources["arm"];
    assert_eq!(source.format, SourceFormat::Urdf);
    assert_eq!(source.name, "arm");

    // The source record shares the import's history step
    assert!(engine.undo());
    assert!(engine.document().sources.is_empty());
    assert!(engine.redo());
    let doc = engine.document();
    assert_eq!(doc.sources.len(), 1);

    let output = engine.export_robot(&report.root_id, &ExportOptions::default()).unwrap();
    assert_eq!(output.robot.name, "arm");
    assert_eq!(output.robot.links.len(), 2);
    assert_eq!(output.robot.joints.len(), 1);
    assert_eq!(output.robot.link("base").unwrap().visuals.len(), 1);

    let shoulder = &output.robot.joints[0];
    assert_eq!(shoulder.name, "shoulder");
    assert_eq!(shoulder.parent, "base");
    assert_eq!(shoulder.child, "upper");
    assert!((shoulder.origin.xyz[2] - 1.0).abs() < 1e-9);
    assert!(output.text.contains("<joint name=\"shoulder\" type=\"revolute\">"));
}

#[test]
fn test_editor_offset_authored_through_fragment_edit() {
    let mut engine = Engine::default();
    let report = engine.import_robot(ARM, ImportOptions::default()).unwrap();
    let base = engine.document().find_by_name("base").unwrap().clone();
    let mut fragment = base.link_fragment().unwrap().clone();
    fragment.editor_offset = Some(Pose::from_xyz([0.0, 0.0, 0.25]));

    let edit = Mutation::SetRobotFragment {
        node_id: base.id.clone(),
        fragment: Some(RobotFragment::Link(fragment)),
    };
    assert!(engine.execute(edit, ExecuteOptions::default()));

    let output = engine.export_robot(&report.root_id, &ExportOptions::default()).unwrap();
    assert!((output.robot.joints[0].origin.xyz[2] - 1.25).abs() < 1e-9);
}

#[test]
fn test_import_merges_into_existing_robot() {
    init_tracing();
    let mut engine = Engine::default();
    let first = engine.import_robot(ARM, ImportOptions::default()).unwrap();

    let options = ImportOptions {
        parent_id: Some(first.root_id.clone()),
        ..ImportOptions::default()
    };
    let merged = engine.import_robot(ARM, options).unwrap();
    assert_eq!(merged.root_id, first.root_id);

    let doc = engine.document();
    assert_eq!(doc.roots().len(), 1);
    assert!(doc.check_invariants().is_empty());

    // Clashing names were renamed and joint labels followed the structure
    let joint = doc.find_by_name("shoulder_1").unwrap().joint_fragment().unwrap();
    assert_eq!(joint.parent, "base_1");
    assert_eq!(joint.child, "upper_1");

    let output = engine.export_robot(&first.root_id, &ExportOptions::default()).unwrap();
    assert_eq!(output.robot.links.len(), 4);
    assert_eq!(output.robot.joints.len(), 2);
}

#[test]
fn test_import_targets_are_checked() {
    let mut engine = Engine::default();
    let first = engine.import_robot(ARM, ImportOptions::default()).unwrap();

    let missing = ImportOptions {
        parent_id: Some(id("nowhere")),
        ..ImportOptions::default()
    };
    match engine.import_robot(ARM, missing) {
        Err(EditorError::NodeNotFound(target)) => assert_eq!(target, id("nowhere")),
        other => panic!("expected NodeNotFound, got {:?}", other),
    }

    // A link is not a robot: import lands as a new robot with a warning
    let base = engine.document().find_by_name("base").unwrap().id.clone();
    let not_robot = ImportOptions {
        parent_id: Some(base),
        ..ImportOptions::default()
    };
    let report = engine.import_robot(ARM, not_robot).unwrap();
    assert_ne!(report.root_id, first.root_id);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(engine.document().roots().len(), 2);
}

#[test]
fn test_unreadable_description_is_an_error() {
    let mut engine = Engine::default();
    let before = engine.document();
    assert!(matches!(
        engine.import_robot("<model/>", ImportOptions::default()),
        Err(EditorError::Import { .. })
    ));
    assert!(Arc::ptr_eq(&before, &engine.document()));
}

#[test]
fn test_export_rejects_non_robot_root() {
    let mut engine = Engine::default();
    let report = engine.import_robot(ARM, ImportOptions::default()).unwrap();
    let base = engine.document().find_by_name("base").unwrap().id.clone();

    assert!(matches!(
        engine.export_robot(&base, &ExportOptions::default()),
        Err(EditorError::Export(_))
    ));
    assert!(engine.export_robot(&report.root_id, &ExportOptions::default()).is_ok());
}

#[test]
fn test_config_file_limits_history() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(DEFAULT_CONFIG_NAME),
        r#"{ "historyDepth": 2, "maxFollowUpRounds": 4 }"#,
    )
    .unwrap();

    let config = EngineConfig::load(dir.path()).unwrap();
    assert_eq!(config.history_depth, 2);
    assert_eq!(config.max_follow_up_rounds, 4);
    assert!(config.synchronize_on_execute);

    let mut engine = Engine::new(config);
    for name in ["One", "Two", "Three"] {
        add(&mut engine, NodeInput::new(NodeKind::Robot, name));
    }
    assert!(engine.undo());
    assert!(engine.undo());
    assert!(!engine.undo());
    assert_eq!(engine.document().len(), 1);
}

#[test]
fn test_seed_replaces_document_and_history() {
    let mut engine = Engine::default();
    add(&mut engine, NodeInput::new(NodeKind::Robot, "Robot").with_id("robot"));
    add(&mut engine, NodeInput::new(NodeKind::Link, "Base").with_id("base").under("robot"));
    let snapshot = engine.render_snapshot();

    let mut other = Engine::default();
    other.seed(snapshot.clone());
    assert!(!other.can_undo());
    assert_eq!(other.render_snapshot(), snapshot);
}
