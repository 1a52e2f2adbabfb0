//! # Armature Scene
//!
//! Document model for composable kinematic assemblies: a typed tree of
//! robots, links, joints and their visual/collision geometry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ scene: Document + Node data model           │
//! │  - Typed nodes with component bags          │
//! │  - Robot fragments (link/joint metadata)    │
//! │  - Pose / inertia / geometry math           │
//! │  - Kinematic chain resolver                 │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ urdf: robot description import/export       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: mutations, mirror sync, history     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! This crate holds data and read-only queries only. All structural edits
//! live in the editor crate so the parent/children duality is maintained in
//! one place.

pub mod document;
pub mod fragment;
pub mod geometry;
pub mod id;
pub mod kinematics;
pub mod node;

pub use document::{
    Document, InvariantViolation, Metadata, RenderNode, RenderSnapshot, Scene, SourceFormat,
    SourceRecord,
};
pub use fragment::{
    default_axis, CollisionElement, JointDynamics, JointFragment, JointLimit, JointMimic, JointType,
    LinkFragment, Material, RobotFragment, VisualElement,
};
pub use geometry::{
    decompose, is_unit_scale, scale_matrix, Decomposed, Geometry, Inertia, Inertial, Pose,
};
pub use id::NodeId;
pub use node::{
    Components, MirrorRef, Node, NodeInput, NodeKind, NodeSource, Physics, PhysicsFields, Transform,
    VisualFlags,
};
