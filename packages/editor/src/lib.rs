//! # Armature Editor
//!
//! Editing engine for kinematic scene documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ scene: nodes, document, chain resolver      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: commands, mirror sync, history      │
//! │  - Pure tree mutations on Arc snapshots     │
//! │  - Collision mirror + joint relabel passes  │
//! │  - Undo/redo of before/after snapshots      │
//! │  - Synchronous change notification          │
//! └─────────────────────────────────────────────┘
//!                     ↕
//! ┌─────────────────────────────────────────────┐
//! │ urdf: robot-description import/export       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Snapshots are immutable**: every edit yields a new `Arc<Document>`
//! 2. **Unchanged means same pointer**: no-op edits return their input
//! 3. **Derived structure is recomputed**: collision shadows and joint labels
//!    follow the user-authored tree after every accepted command
//!
//! ## Usage
//!
//! ```rust,ignore
//! use armature_editor::{Engine, EngineConfig, ExecuteOptions, Mutation};
//! use armature_scene::{NodeInput, NodeKind};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//!
//! engine.execute(
//!     Mutation::AddNode { node: NodeInput::new(NodeKind::Robot, "Rover") },
//!     ExecuteOptions::default(),
//! );
//!
//! engine.undo();
//! engine.redo();
//! ```

mod command;
mod config;
mod engine;
mod errors;
mod events;
mod mirror;
mod mutations;
mod post_effects;
mod tree;
mod undo_stack;

pub use command::Command;
pub use config::{EngineConfig, DEFAULT_CONFIG_NAME};
pub use engine::{Engine, ExecuteOptions, ImportOptions, ImportReport};
pub use errors::EditorError;
pub use events::{ChangeReason, EngineEvent, EventKind, FollowUps, SubscriptionId};
pub use mirror::MirrorCollisions;
pub use mutations::{
    add_node, add_nodes, clone_subtree, collect_subtree, paste_subtree, remove_subtree, select,
    set_node_name, set_node_parent, set_node_physics, set_node_robot_fragment, set_node_transform,
    set_node_visual, Mutation, PasteOptions, SubtreePayload,
};
pub use post_effects::{synchronize, PostEffect, PostEffectEngine, RelabelJoints};
pub use tree::unique_name;
pub use undo_stack::{HistoryRecord, UndoStack, DEFAULT_MAX_LEVELS};

// Re-export the model and pipeline crates for convenience
pub use armature_scene as scene;
pub use armature_urdf as urdf;
