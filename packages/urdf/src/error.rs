use armature_scene::NodeId;
use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

/// Hard export failures; skipped joints are reported as warnings instead
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Export root {0} does not exist")]
    UnknownRoot(NodeId),

    #[error("Export root {id} is a {kind}, expected a robot")]
    NotARobot { id: NodeId, kind: &'static str },

    #[error("Robot {0} has no exportable links")]
    NoLinks(NodeId),

    #[error("Failed to write robot description: {0}")]
    Write(String),
}

impl ExportError {
    pub fn write(message: impl std::fmt::Display) -> Self {
        Self::Write(message.to_string())
    }
}

/// Problems met while reading robot-description text.
///
/// Only `Xml` and `MissingRobot` abort an import; the rest become warnings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Document has no <robot> root element")]
    MissingRobot,

    #[error("Invalid number {value:?} in {element}@{attribute}")]
    InvalidNumber {
        element: String,
        attribute: String,
        value: String,
    },

    #[error("Skipping {element}: missing required attribute {attribute}")]
    MissingAttribute { element: String, attribute: String },

    #[error("Skipping {element} {name:?}: {reason}")]
    Skipped {
        element: String,
        name: String,
        reason: String,
    },
}

impl ImportError {
    pub fn xml(message: impl std::fmt::Display) -> Self {
        Self::Xml(message.to_string())
    }

    pub fn missing_attribute(element: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            element: element.into(),
            attribute: attribute.into(),
        }
    }

    pub fn skipped(
        element: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Skipped {
            element: element.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }
}
