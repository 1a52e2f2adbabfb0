//! Robot description → add-ready scene nodes.

use crate::description::RobotDescription;
use armature_scene::{
    Geometry, LinkFragment, Material, NodeId, NodeInput, NodeKind, NodeSource, Pose, RobotFragment,
    Transform,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Per-element data a mesh node keeps in its provenance for export
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementProvenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
}

impl ElementProvenance {
    pub fn read(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Convert a description into node inputs, parents listed before children.
///
/// The first entry is the robot. Visual and collision entries become mesh
/// nodes under `Visual`/`Collision` containers; the link fragment keeps only
/// the inertial so the nodes stay the single source for geometry.
pub fn robot_nodes(robot: &RobotDescription) -> Vec<NodeInput> {
    let robot_id = NodeId::fresh();
    let mut builder = NodeBuilder {
        robot,
        out: vec![NodeInput::new(NodeKind::Robot, robot.name.as_str()).with_id(robot_id.clone())],
        placed: HashSet::new(),
    };

    for link in robot.root_links() {
        builder.link(link, &robot_id);
    }
    // links only reachable through a joint cycle
    for link in &robot.links {
        if !builder.placed.contains(link.name.as_str()) {
            warn!(link = %link.name, "Link is not reachable from a root link");
            builder.link(link, &robot_id);
        }
    }
    builder.out
}

struct NodeBuilder<'a> {
    robot: &'a RobotDescription,
    out: Vec<NodeInput>,
    placed: HashSet<&'a str>,
}

impl<'a> NodeBuilder<'a> {
    fn link(&mut self, link: &'a LinkFragment, parent: &NodeId) {
        if !self.placed.insert(link.name.as_str()) {
            return;
        }
        let link_id = NodeId::fresh();
        let fragment = LinkFragment {
            visuals: Vec::new(),
            collisions: Vec::new(),
            ..link.clone()
        };
        self.out.push(
            NodeInput::new(NodeKind::Link, link.name.as_str())
                .with_id(link_id.clone())
                .under(parent.clone())
                .with_fragment(RobotFragment::Link(fragment)),
        );

        if !link.visuals.is_empty() {
            let container = self.container(NodeKind::Visual, &link_id);
            for visual in &link.visuals {
                let provenance = ElementProvenance {
                    name: visual.name.clone(),
                    material: visual.material.clone(),
                };
                self.mesh(&container, &visual.origin, &visual.geometry, provenance);
            }
        }
        if !link.collisions.is_empty() {
            let container = self.container(NodeKind::Collision, &link_id);
            for collision in &link.collisions {
                let provenance = ElementProvenance {
                    name: collision.name.clone(),
                    material: None,
                };
                self.mesh(&container, &collision.origin, &collision.geometry, provenance);
            }
        }

        let robot = self.robot;
        for joint in robot.joints_from(&link.name) {
            let Some(child) = robot.link(&joint.child) else {
                warn!(joint = %joint.name, child = %joint.child, "Joint child link not found");
                continue;
            };
            if self.placed.contains(child.name.as_str()) {
                continue;
            }
            let joint_id = NodeId::fresh();
            self.out.push(
                NodeInput::new(NodeKind::Joint, joint.name.as_str())
                    .with_id(joint_id.clone())
                    .under(link_id.clone())
                    .with_transform(Transform::from_pose(&joint.origin))
                    .with_fragment(RobotFragment::Joint(joint.clone())),
            );
            self.link(child, &joint_id);
        }
    }

    fn container(&mut self, kind: NodeKind, parent: &NodeId) -> NodeId {
        let id = NodeId::fresh();
        self.out.push(NodeInput::new(kind, "").with_id(id.clone()).under(parent.clone()));
        id
    }

    fn mesh(
        &mut self,
        parent: &NodeId,
        origin: &Pose,
        geometry: &Geometry,
        provenance: ElementProvenance,
    ) {
        let name = provenance
            .name
            .clone()
            .unwrap_or_else(|| capitalize(geometry.type_name()));
        let mut input = NodeInput::new(NodeKind::Mesh, name)
            .under(parent.clone())
            .with_source(NodeSource::Primitive {
                shape: geometry.clone(),
            });
        if !origin.is_identity() {
            input = input.with_transform(Transform::from_pose(origin));
        }
        if provenance != ElementProvenance::default() {
            input.components.provenance = serde_json::to_value(&provenance).ok();
        }
        self.out.push(input);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_robot;

    const TEXT: &str = r#"<robot name="arm">
  <link name="base">
    <visual><geometry><box size="1 1 1"/></geometry></visual>
    <collision><origin xyz="0 0 0.5"/><geometry><sphere radius="0.5"/></geometry></collision>
  </link>
  <link name="upper"/>
  <joint name="shoulder" type="revolute">
    <parent link="base"/><child link="upper"/>
    <origin xyz="0 0 1"/>
  </joint>
</robot>"#;

    #[test]
    fn test_nodes_are_parent_first() {
        let robot = parse_robot(TEXT).robot.unwrap();
        let nodes = robot_nodes(&robot);
        let kinds: Vec<_> = nodes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Robot,
                NodeKind::Link,
                NodeKind::Visual,
                NodeKind::Mesh,
                NodeKind::Collision,
                NodeKind::Mesh,
                NodeKind::Joint,
                NodeKind::Link,
            ]
        );

        let mut seen = HashSet::new();
        for node in &nodes {
            if let Some(parent) = &node.parent_id {
                assert!(seen.contains(parent), "{} listed before its parent", node.name);
            }
            if let Some(id) = &node.id {
                seen.insert(id.clone());
            }
        }
    }

    #[test]
    fn test_joint_carries_origin_and_fragment() {
        let robot = parse_robot(TEXT).robot.unwrap();
        let nodes = robot_nodes(&robot);
        let joint = nodes.iter().find(|n| n.kind == NodeKind::Joint).unwrap();
        assert_eq!(joint.components.transform.unwrap().position, [0.0, 0.0, 1.0]);
        assert!(matches!(
            joint.components.robot_fragment,
            Some(RobotFragment::Joint(ref fragment)) if fragment.child == "upper"
        ));

        let link = &nodes[1];
        match &link.components.robot_fragment {
            Some(RobotFragment::Link(fragment)) => {
                assert_eq!(fragment.name, "base");
                assert!(fragment.visuals.is_empty());
            }
            other => panic!("unexpected fragment {:?}", other),
        }
    }

    #[test]
    fn test_mesh_nodes_keep_shape_and_origin() {
        let robot = parse_robot(TEXT).robot.unwrap();
        let nodes = robot_nodes(&robot);
        let sphere = nodes.iter().find(|n| n.name == "Sphere").unwrap();
        assert_eq!(
            sphere.source,
            Some(NodeSource::Primitive {
                shape: Geometry::Sphere { radius: 0.5 }
            })
        );
        assert_eq!(sphere.components.transform.unwrap().position, [0.0, 0.0, 0.5]);
    }
}
