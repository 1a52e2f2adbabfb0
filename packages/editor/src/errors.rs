//! Error types for the editor

use armature_scene::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Export error: {0}")]
    Export(#[from] armature_urdf::ExportError),

    #[error("Robot description could not be read: {}", .warnings.join("; "))]
    Import { warnings: Vec<String> },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}
