//! Commands: labelled, pure document transforms the engine can record.

use crate::mutations::Mutation;
use armature_scene::Document;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

type ApplyFn = dyn Fn(&Arc<Document>) -> Arc<Document> + Send + Sync;

/// `{ id, label, apply }`; `apply` must be total and return its input when
/// there is nothing to do
#[derive(Clone)]
pub struct Command {
    pub id: String,
    pub label: String,
    apply: Arc<ApplyFn>,
}

impl Command {
    pub fn new<F>(label: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&Arc<Document>) -> Arc<Document> + Send + Sync + 'static,
    {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            label: label.into(),
            apply: Arc::new(apply),
        }
    }

    /// Wrap a serializable mutation, labelled after its kind
    pub fn from_mutation(mutation: Mutation) -> Self {
        let label = mutation.label();
        Self::new(label, move |doc| mutation.apply(doc))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn apply(&self, doc: &Arc<Document>) -> Arc<Document> {
        (self.apply)(doc)
    }
}

impl From<Mutation> for Command {
    fn from(mutation: Mutation) -> Self {
        Command::from_mutation(mutation)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
