//! # Robot export
//!
//! Composes every exported entity into the frame the robot-description
//! format expects.
//!
//! ## Frames
//!
//! For a link with frame `F` (identity below a joint, else its own rigid
//! transform), node scale `S` and editor offset `O`:
//!
//! ```text
//! visual/collision/inertial pose = F · S · O · local
//! joint origin                   = O_parent · F_parent · S_parent · W · J · C
//! ```
//!
//! `W` is the chain of wrapper nodes between the parent link and the joint,
//! `J` the joint's rigid transform and `C` the child link's rigid transform.
//! Geometry is scaled by the scale recovered from the composed matrix.

use crate::description::RobotDescription;
use crate::error::{ExportError, ExportResult};
use crate::import::ElementProvenance;
use crate::serializer::write_robot;
use armature_scene::kinematics::{joint_child_link_ids, joint_parent_link_id, resolve_link_label};
use armature_scene::{
    decompose, CollisionElement, Document, Geometry, Inertia, Inertial, JointFragment, JointType,
    LinkFragment, Node, NodeId, NodeKind, Pose, VisualElement,
};
use nalgebra::{Matrix4, Vector3};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Overrides the robot node's display name
    pub robot_name: Option<String>,
    /// Apply stored editor offsets to link contents and child joints
    pub include_editor_offsets: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            robot_name: None,
            include_editor_offsets: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub text: String,
    pub robot: RobotDescription,
    /// Skipped joints and other recoverable problems
    pub warnings: Vec<String>,
    /// Exported identifier of every link and joint node
    pub identifiers: BTreeMap<NodeId, String>,
}

/// Export the robot rooted at `root_id`
pub fn export_robot(
    doc: &Document,
    root_id: &NodeId,
    options: &ExportOptions,
) -> ExportResult<ExportOutput> {
    let root = doc
        .node(root_id)
        .ok_or_else(|| ExportError::UnknownRoot(root_id.clone()))?;
    if root.kind != NodeKind::Robot {
        return Err(ExportError::NotARobot {
            id: root_id.clone(),
            kind: root.kind.as_str(),
        });
    }

    let members = doc.subtree_ids(root_id);
    let links: Vec<&Node> = members
        .iter()
        .filter_map(|id| doc.node(id))
        .filter(|node| node.kind == NodeKind::Link)
        .collect();
    if links.is_empty() {
        return Err(ExportError::NoLinks(root_id.clone()));
    }
    let joints: Vec<&Node> = members
        .iter()
        .filter_map(|id| doc.node(id))
        .filter(|node| node.kind == NodeKind::Joint)
        .collect();

    let mut names = Identifiers::default();
    for link in &links {
        names.assign(&link.id, resolve_link_label(link));
    }
    for joint in &joints {
        let label = joint.joint_fragment().map(|f| f.name.as_str()).unwrap_or(joint.name.as_str());
        names.assign(&joint.id, label);
    }

    let exporter = Exporter { doc, options };
    let mut warnings = Vec::new();

    let mut joint_entries = Vec::new();
    for joint in &joints {
        match exporter.joint(joint, &names) {
            Ok((entry, extra)) => {
                if let Some(extra) = extra {
                    warnings.push(extra);
                }
                joint_entries.push(entry);
            }
            Err(reason) => {
                warn!(joint = %joint.name, %reason, "Skipping joint");
                warnings.push(reason);
            }
        }
    }

    // mimic targets refer to joints by their authored name
    let joint_names: HashMap<String, String> = joints
        .iter()
        .filter_map(|joint| {
            let authored = joint.joint_fragment()?.name.clone();
            Some((authored, names.get(&joint.id)?.to_string()))
        })
        .collect();
    for entry in &mut joint_entries {
        if let Some(mimic) = entry.mimic.as_mut() {
            if let Some(renamed) = joint_names.get(&mimic.joint) {
                mimic.joint = renamed.clone();
            }
        }
    }

    let link_entries = links
        .iter()
        .map(|link| exporter.link(link, &names))
        .collect();

    let robot_name = options
        .robot_name
        .clone()
        .unwrap_or_else(|| sanitize(&root.name));
    let robot = RobotDescription {
        name: robot_name,
        links: link_entries,
        joints: joint_entries,
    };
    let text = write_robot(&robot)?;
    info!(
        robot = %robot.name,
        links = robot.links.len(),
        joints = robot.joints.len(),
        warnings = warnings.len(),
        "Exported robot"
    );

    Ok(ExportOutput {
        text,
        robot,
        warnings,
        identifiers: names.assigned,
    })
}

/// Replace anything outside `[A-Za-z0-9_]`; identifiers never start with a digit
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push_str("unnamed");
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "n_");
    }
    out
}

/// Collision-free exported identifiers: `name`, `name_2`, `name_3`, ...
#[derive(Debug, Default)]
struct Identifiers {
    taken: HashSet<String>,
    assigned: BTreeMap<NodeId, String>,
}

impl Identifiers {
    fn assign(&mut self, id: &NodeId, label: &str) {
        let base = sanitize(label);
        let mut candidate = base.clone();
        let mut index = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, index);
            index += 1;
        }
        self.taken.insert(candidate.clone());
        self.assigned.insert(id.clone(), candidate);
    }

    fn get(&self, id: &NodeId) -> Option<&str> {
        self.assigned.get(id).map(String::as_str)
    }
}

struct Exporter<'a> {
    doc: &'a Document,
    options: &'a ExportOptions,
}

impl<'a> Exporter<'a> {
    fn offset(&self, link: &Node) -> Matrix4<f64> {
        match link.link_fragment().and_then(|f| f.editor_offset) {
            Some(offset) if self.options.include_editor_offsets && !offset.is_identity() => {
                offset.to_matrix()
            }
            _ => Matrix4::identity(),
        }
    }

    /// `F · S · O` for a link's contents
    fn content_frame(&self, link: &Node) -> Matrix4<f64> {
        let transform = link.transform();
        let frame = if self.has_incoming_joint(link) {
            Matrix4::identity()
        } else {
            transform.rigid_matrix()
        };
        frame * transform.scale_matrix() * self.offset(link)
    }

    fn link(&self, link: &Node, names: &Identifiers) -> LinkFragment {
        let frame = self.content_frame(link);
        let fragment = link.link_fragment();
        let mut entry = LinkFragment::named(names.get(&link.id).unwrap_or(link.name.as_str()));

        entry.inertial = match fragment.and_then(|f| f.inertial) {
            Some(inertial) => Some(transform_inertial(&frame, &inertial)),
            None => {
                synthesized_inertial(link).map(|inertial| transform_inertial(&frame, &inertial))
            }
        };

        let authored_visuals = fragment.map(|f| f.visuals.as_slice()).unwrap_or_default();
        entry.visuals = if authored_visuals.is_empty() {
            self.primitives(link, NodeKind::Visual)
                .into_iter()
                .map(|(local, geometry, provenance)| {
                    let (origin, geometry) = place(&frame, &local, &geometry);
                    VisualElement {
                        name: provenance.name,
                        origin,
                        geometry,
                        material: provenance.material,
                    }
                })
                .collect()
        } else {
            authored_visuals
                .iter()
                .map(|visual| {
                    let local = visual.origin.to_matrix();
                    let (origin, geometry) = place(&frame, &local, &visual.geometry);
                    VisualElement {
                        origin,
                        geometry,
                        ..visual.clone()
                    }
                })
                .collect()
        };

        let authored_collisions = fragment.map(|f| f.collisions.as_slice()).unwrap_or_default();
        entry.collisions = if authored_collisions.is_empty() {
            self.primitives(link, NodeKind::Collision)
                .into_iter()
                .map(|(local, geometry, provenance)| {
                    let (origin, geometry) = place(&frame, &local, &geometry);
                    CollisionElement {
                        name: provenance.name,
                        origin,
                        geometry,
                    }
                })
                .collect()
        } else {
            authored_collisions
                .iter()
                .map(|collision| {
                    let local = collision.origin.to_matrix();
                    let (origin, geometry) = place(&frame, &local, &collision.geometry);
                    CollisionElement {
                        origin,
                        geometry,
                        ..collision.clone()
                    }
                })
                .collect()
        };

        entry
    }

    /// Primitive-backed mesh nodes under this link's `container` nodes, with
    /// their transform relative to the link
    fn primitives(
        &self,
        link: &Node,
        container: NodeKind,
    ) -> Vec<(Matrix4<f64>, Geometry, ElementProvenance)> {
        let mut found = Vec::new();
        let mut stack: Vec<(&NodeId, Matrix4<f64>, bool)> = link
            .children
            .iter()
            .rev()
            .map(|child| (child, Matrix4::identity(), false))
            .collect();

        while let Some((id, parent_matrix, inside)) = stack.pop() {
            let Some(node) = self.doc.node(id) else {
                continue;
            };
            if matches!(node.kind, NodeKind::Link | NodeKind::Joint) {
                continue;
            }
            let matrix = parent_matrix * node.transform().matrix();
            let inside = inside || node.kind == container;

            if inside && node.kind == NodeKind::Mesh {
                if let Some(shape) = node.source.as_ref().and_then(|source| source.shape()) {
                    let provenance = node
                        .components
                        .provenance
                        .as_ref()
                        .and_then(ElementProvenance::read)
                        .unwrap_or_default();
                    found.push((matrix, shape.clone(), provenance));
                }
            }
            stack.extend(node.children.iter().rev().map(|child| (child, matrix, inside)));
        }
        found
    }

    /// Returns the joint entry and an optional extra warning
    fn joint(
        &self,
        joint: &Node,
        names: &Identifiers,
    ) -> Result<(JointFragment, Option<String>), String> {
        let parent_id = joint_parent_link_id(self.doc, &joint.id)
            .ok_or_else(|| format!("Joint {:?} skipped: no parent link", joint.name))?;
        let children = joint_child_link_ids(self.doc, &joint.id);
        let child_id = children
            .first()
            .ok_or_else(|| format!("Joint {:?} skipped: no child link", joint.name))?;
        if child_id == parent_id {
            return Err(format!("Joint {:?} skipped: links a link to itself", joint.name));
        }
        let (Some(parent_name), Some(child_name)) = (names.get(parent_id), names.get(child_id))
        else {
            return Err(format!(
                "Joint {:?} skipped: link outside the exported robot",
                joint.name
            ));
        };
        let extra = (children.len() > 1).then(|| {
            format!(
                "Joint {:?} has {} child links; exporting only {}",
                joint.name,
                children.len(),
                child_name
            )
        });

        let (Some(parent), Some(child)) = (self.doc.node(parent_id), self.doc.node(child_id)) else {
            return Err(format!("Joint {:?} skipped: missing link", joint.name));
        };
        let parent_has_joint = self.has_incoming_joint(parent);
        let parent_transform = parent.transform();
        let parent_frame = if parent_has_joint {
            Matrix4::identity()
        } else {
            parent_transform.rigid_matrix()
        };

        let origin = self.offset(parent)
            * parent_frame
            * parent_transform.scale_matrix()
            * self.wrapper_chain(parent_id, joint)
            * joint.transform().rigid_matrix()
            * child.transform().rigid_matrix();

        let mut entry = joint
            .joint_fragment()
            .cloned()
            .unwrap_or_else(|| JointFragment::new(joint.name.as_str(), JointType::Fixed));
        entry.name = names.get(&joint.id).unwrap_or(joint.name.as_str()).to_string();
        entry.parent = parent_name.to_string();
        entry.child = child_name.to_string();
        entry.origin = decompose(&origin).pose;
        entry.axis = normalized_axis(entry.axis);

        Ok((entry, extra))
    }

    /// Product of full transforms strictly between `link` and `joint`
    fn wrapper_chain(&self, link: &NodeId, joint: &Node) -> Matrix4<f64> {
        let mut chain = Vec::new();
        let mut current = joint.parent_id.as_ref();
        while let Some(id) = current {
            if id == link {
                break;
            }
            let Some(node) = self.doc.node(id) else {
                break;
            };
            chain.push(node.transform().matrix());
            current = node.parent_id.as_ref();
        }
        chain.iter().rev().fold(Matrix4::identity(), |acc, m| acc * m)
    }

    /// Links sit directly under their incoming joint
    fn has_incoming_joint(&self, link: &Node) -> bool {
        link.parent_id
            .as_ref()
            .and_then(|parent| self.doc.node(parent))
            .is_some_and(|parent| parent.kind == NodeKind::Joint)
    }
}

/// Compose `frame · local`, returning the rigid origin and scaled geometry
fn place(frame: &Matrix4<f64>, local: &Matrix4<f64>, geometry: &Geometry) -> (Pose, Geometry) {
    let parts = decompose(&(frame * local));
    (parts.pose, geometry.scaled(parts.scale))
}

fn transform_inertial(frame: &Matrix4<f64>, inertial: &Inertial) -> Inertial {
    let parts = decompose(&(frame * inertial.origin.to_matrix()));
    Inertial {
        origin: parts.pose,
        mass: inertial.mass,
        inertia: inertial.inertia.scaled(parts.scale.map(f64::abs)),
    }
}

/// Inertial block derived from authored physics when no fragment carries one
fn synthesized_inertial(link: &Node) -> Option<Inertial> {
    let physics = link.components.physics?;
    let fields = link.components.physics_fields;
    let mass = if !fields.mass && fields.density {
        physics.density * physics.volume
    } else {
        physics.mass
    };
    let inertia = match physics.inertia_tensor {
        Some(tensor) if fields.inertia_tensor || !fields.inertia => tensor,
        _ => Inertia::diagonal(physics.inertia),
    };
    Some(Inertial {
        origin: Pose::from_xyz(physics.center_of_mass),
        mass,
        inertia,
    })
}

fn normalized_axis(axis: [f64; 3]) -> [f64; 3] {
    let vector = Vector3::new(axis[0], axis[1], axis[2]);
    let length = vector.norm();
    if !length.is_finite() || length < 1e-12 {
        return armature_scene::default_axis();
    }
    let unit = vector / length;
    [unit.x, unit.y, unit.z]
}
