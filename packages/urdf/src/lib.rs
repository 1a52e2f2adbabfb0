//! # Armature URDF
//!
//! Reads and writes the robot-description text format for scene documents.
//!
//! ## Pipeline
//!
//! ```text
//! text ──parse_robot──▶ RobotDescription ──robot_nodes──▶ Vec<NodeInput>
//!
//! Document ──export_robot──▶ RobotDescription ──write_robot──▶ text
//! ```
//!
//! Import never fails outright: unreadable text yields no robot plus
//! warnings, and malformed elements are skipped with a warning. Export fails
//! only for an unusable root; skipped joints are reported as warnings.
//!
//! ## Example
//!
//! ```rust,ignore
//! use armature_urdf::{export_robot, parse_robot, robot_nodes, ExportOptions};
//!
//! let parsed = parse_robot(&text);
//! let inputs = robot_nodes(&parsed.robot.unwrap());
//!
//! let output = export_robot(&doc, &robot_id, &ExportOptions::default())?;
//! std::fs::write("robot.urdf", output.text)?;
//! ```

mod description;
mod error;
mod export;
mod format;
mod import;
mod parser;
mod serializer;

pub use description::RobotDescription;
pub use error::{ExportError, ExportResult, ImportError};
pub use export::{export_robot, sanitize, ExportOptions, ExportOutput};
pub use format::{format_number, format_vector};
pub use import::{robot_nodes, ElementProvenance};
pub use parser::{parse_robot, ImportResult};
pub use serializer::write_robot;
