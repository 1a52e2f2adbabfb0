//! # Robot fragments
//!
//! Link- and joint-shaped pieces of robot-description metadata attached to
//! tree nodes. They hold everything export needs that the tree itself does
//! not encode (inertials, authored visual/collision entries, joint limits).

use crate::geometry::{Geometry, Inertial, Pose};
use serde::{Deserialize, Serialize};

/// Robot-description metadata attached to a `link` or `joint` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RobotFragment {
    Link(LinkFragment),
    Joint(JointFragment),
}

impl RobotFragment {
    pub fn name(&self) -> &str {
        match self {
            RobotFragment::Link(link) => &link.name,
            RobotFragment::Joint(joint) => &joint.name,
        }
    }

    pub fn as_link(&self) -> Option<&LinkFragment> {
        match self {
            RobotFragment::Link(link) => Some(link),
            RobotFragment::Joint(_) => None,
        }
    }

    pub fn as_joint(&self) -> Option<&JointFragment> {
        match self {
            RobotFragment::Joint(joint) => Some(joint),
            RobotFragment::Link(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkFragment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inertial: Option<Inertial>,
    #[serde(default)]
    pub visuals: Vec<VisualElement>,
    #[serde(default)]
    pub collisions: Vec<CollisionElement>,
    /// Pose correction applied at export to keep the link's world placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_offset: Option<Pose>,
}

impl LinkFragment {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub origin: Pose,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub origin: Pose,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JointType {
    Revolute,
    Continuous,
    Prismatic,
    #[default]
    Fixed,
    Floating,
    Planar,
}

impl JointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JointType::Revolute => "revolute",
            JointType::Continuous => "continuous",
            JointType::Prismatic => "prismatic",
            JointType::Fixed => "fixed",
            JointType::Floating => "floating",
            JointType::Planar => "planar",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "revolute" => Some(JointType::Revolute),
            "continuous" => Some(JointType::Continuous),
            "prismatic" => Some(JointType::Prismatic),
            "fixed" => Some(JointType::Fixed),
            "floating" => Some(JointType::Floating),
            "planar" => Some(JointType::Planar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointFragment {
    pub name: String,
    pub joint_type: JointType,
    /// Label of the parent link
    pub parent: String,
    /// Label of the child link
    pub child: String,
    #[serde(default)]
    pub origin: Pose,
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<JointLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamics: Option<JointDynamics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimic: Option<JointMimic>,
}

pub fn default_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

impl JointFragment {
    pub fn new(name: impl Into<String>, joint_type: JointType) -> Self {
        Self {
            name: name.into(),
            joint_type,
            parent: String::new(),
            child: String::new(),
            origin: Pose::default(),
            axis: default_axis(),
            limit: None,
            dynamics: None,
            mimic: None,
        }
    }

    pub fn between(mut self, parent: impl Into<String>, child: impl Into<String>) -> Self {
        self.parent = parent.into();
        self.child = child.into();
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointLimit {
    pub lower: f64,
    pub upper: f64,
    pub effort: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointDynamics {
    pub damping: f64,
    pub friction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JointMimic {
    pub joint: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_multiplier() -> f64 {
    1.0
}
