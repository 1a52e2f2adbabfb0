//! # Scene nodes
//!
//! A node is one element of the kinematic tree. Structure (`parent_id`,
//! `children`) is owned by the document and only changed through the editor's
//! reparent primitive; everything else lives in the component bag.

use crate::fragment::RobotFragment;
use crate::geometry::{scale_matrix, Geometry, Inertia, Pose};
use crate::id::NodeId;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

/// Closed set of node roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Robot,
    Link,
    Joint,
    Visual,
    Collision,
    Mesh,
    Group,
    Light,
    Camera,
    Other,
}

impl NodeKind {
    /// Visual/collision containers share canonical display names
    pub fn canonical_name(&self) -> Option<&'static str> {
        match self {
            NodeKind::Visual => Some("Visual"),
            NodeKind::Collision => Some("Collision"),
            _ => None,
        }
    }

    /// Kinds reproduced under a collision container by the mirror
    pub fn is_mirrorable(&self) -> bool {
        matches!(self, NodeKind::Mesh | NodeKind::Group)
    }

    /// Whether a node of this kind may sit directly under `parent`
    pub fn accepts_parent(&self, parent: NodeKind) -> bool {
        match self {
            NodeKind::Robot => false,
            NodeKind::Link => matches!(parent, NodeKind::Robot | NodeKind::Joint),
            _ => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Robot => "robot",
            NodeKind::Link => "link",
            NodeKind::Joint => "joint",
            NodeKind::Visual => "visual",
            NodeKind::Collision => "collision",
            NodeKind::Mesh => "mesh",
            NodeKind::Group => "group",
            NodeKind::Light => "light",
            NodeKind::Camera => "camera",
            NodeKind::Other => "other",
        }
    }
}

/// Local transform relative to the parent node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub position: [f64; 3],
    /// Roll, pitch, yaw in radians
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl Transform {
    pub fn from_position(position: [f64; 3]) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            position: pose.xyz,
            rotation: pose.rpy,
            scale: [1.0; 3],
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Translation and rotation only
    pub fn rigid_matrix(&self) -> Matrix4<f64> {
        self.pose().to_matrix()
    }

    pub fn scale_matrix(&self) -> Matrix4<f64> {
        scale_matrix(self.scale)
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        self.rigid_matrix() * self.scale_matrix()
    }
}

/// Physical properties authored on a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Physics {
    pub mass: f64,
    pub density: f64,
    pub volume: f64,
    /// Principal moments
    pub inertia: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inertia_tensor: Option<Inertia>,
    pub center_of_mass: [f64; 3],
}

/// Which physics fields were explicitly authored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsFields {
    pub mass: bool,
    pub density: bool,
    pub inertia: bool,
    pub inertia_tensor: bool,
    pub center_of_mass: bool,
}

impl PhysicsFields {
    pub fn all() -> Self {
        Self {
            mass: true,
            density: true,
            inertia: true,
            inertia_tensor: true,
            center_of_mass: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualFlags {
    /// Keep a mirrored collision sibling in sync with this visual
    pub attach_collisions: bool,
}

/// Back-reference from a generated shadow node to its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRef {
    pub source_id: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physics: Option<Physics>,
    #[serde(default, skip_serializing_if = "PhysicsFields::is_empty")]
    pub physics_fields: PhysicsFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_fragment: Option<RobotFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_flags: Option<VisualFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorRef>,
    /// Free-form import provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<serde_json::Value>,
}

/// Where a node's content came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeSource {
    Primitive {
        shape: Geometry,
    },
    Clone {
        from: NodeId,
        /// Primitive shape inherited from the original, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shape: Option<Geometry>,
    },
}

impl NodeSource {
    pub fn shape(&self) -> Option<&Geometry> {
        match self {
            NodeSource::Primitive { shape } => Some(shape),
            NodeSource::Clone { shape, .. } => shape.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    #[serde(default)]
    pub components: Components,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeSource>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: None,
            children: Vec::new(),
            kind,
            components: Components::default(),
            source: None,
        }
    }

    /// Exempt from document-wide name uniqueness
    pub fn is_name_exempt(&self) -> bool {
        self.kind.canonical_name().is_some() || self.components.mirror.is_some()
    }

    pub fn transform(&self) -> Transform {
        self.components.transform.unwrap_or_default()
    }

    pub fn mirror_source(&self) -> Option<&NodeId> {
        self.components.mirror.as_ref().map(|m| &m.source_id)
    }

    pub fn attaches_collisions(&self) -> bool {
        self.kind == NodeKind::Visual
            && self
                .components
                .visual_flags
                .map(|flags| flags.attach_collisions)
                .unwrap_or(false)
    }

    pub fn link_fragment(&self) -> Option<&crate::fragment::LinkFragment> {
        self.components.robot_fragment.as_ref().and_then(RobotFragment::as_link)
    }

    pub fn joint_fragment(&self) -> Option<&crate::fragment::JointFragment> {
        self.components.robot_fragment.as_ref().and_then(RobotFragment::as_joint)
    }
}

/// Intent to create a node; structure is derived from `parent_id` only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub components: Components,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeSource>,
}

impl NodeInput {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            parent_id: None,
            components: Components::default(),
            source: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn under(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.components.transform = Some(transform);
        self
    }

    pub fn with_fragment(mut self, fragment: RobotFragment) -> Self {
        self.components.robot_fragment = Some(fragment);
        self
    }

    pub fn with_source(mut self, source: NodeSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn attaching_collisions(mut self) -> Self {
        self.components.visual_flags = Some(VisualFlags {
            attach_collisions: true,
        });
        self
    }
}
