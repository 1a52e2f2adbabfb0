//! # Document Engine
//!
//! Coordinates the edit lifecycle: Command → Synchronize → Record → Notify
//!
//! The Engine owns:
//! - The current document snapshot
//! - Undo/redo history
//! - The post-effect passes run after each accepted command
//! - Subscribers notified synchronously after every change

use crate::command::Command;
use crate::config::EngineConfig;
use crate::errors::EditorError;
use crate::events::{
    ChangeReason, EngineEvent, EventKind, FollowUps, Handler, SubscriptionId, Subscribers,
};
use crate::mutations::add_nodes;
use crate::post_effects::PostEffectEngine;
use crate::undo_stack::{HistoryRecord, UndoStack};
use armature_scene::{
    Document, NodeId, NodeInput, NodeKind, RenderSnapshot, SourceFormat, SourceRecord,
};
use armature_urdf::{ExportOptions, ExportOutput};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub record_history: bool,
    /// Reported in the change event; defaults to the command label
    pub reason: Option<ChangeReason>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            record_history: true,
            reason: None,
        }
    }
}

impl ExecuteOptions {
    pub fn unrecorded() -> Self {
        Self {
            record_history: false,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Existing robot to receive the imported links instead of a new robot
    pub parent_id: Option<NodeId>,
    pub record_history: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            parent_id: None,
            record_history: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// The new robot node, or the robot the links were merged into
    pub root_id: NodeId,
    pub warnings: Vec<String>,
}

/// Single-document editing façade
pub struct Engine {
    config: EngineConfig,
    document: Arc<Document>,
    history: UndoStack,
    effects: PostEffectEngine,
    subscribers: Subscribers,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_document(config, Document::new())
    }

    pub fn with_document(config: EngineConfig, document: Document) -> Self {
        let history = UndoStack::with_max_levels(config.history_depth);
        let effects = PostEffectEngine::new();
        let document = Arc::new(document);
        let document = if config.synchronize_on_execute {
            effects.run(&document)
        } else {
            document
        };
        Self {
            config,
            document,
            history,
            effects,
            subscribers: Subscribers::default(),
        }
    }

    /// Current snapshot; never mutated after publication
    pub fn document(&self) -> Arc<Document> {
        Arc::clone(&self.document)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn render_snapshot(&self) -> RenderSnapshot {
        self.document.render_snapshot()
    }

    /// Apply a command; returns true when the document changed
    pub fn execute(&mut self, command: impl Into<Command>, options: ExecuteOptions) -> bool {
        let command = command.into();
        let reason = options.reason.unwrap_or_else(|| ChangeReason::Command {
            label: command.label.clone(),
        });
        let mut follow_ups = FollowUps::default();
        let changed = self.execute_inner(&command, options.record_history, reason, &mut follow_ups);
        self.drain(follow_ups);
        changed
    }

    fn execute_inner(
        &mut self,
        command: &Command,
        record_history: bool,
        reason: ChangeReason,
        follow_ups: &mut FollowUps,
    ) -> bool {
        let before = Arc::clone(&self.document);
        let applied = command.apply(&before);
        if Arc::ptr_eq(&applied, &before) {
            debug!(command = %command.label, "Command left document unchanged");
            return false;
        }

        let synced = if self.config.synchronize_on_execute {
            self.effects.run(&applied)
        } else {
            applied
        };
        let after = stamp(synced);
        self.document = Arc::clone(&after);
        info!(command = %command.label, reason = ?reason, nodes = after.len(), "Command applied");

        if record_history {
            let record = HistoryRecord::new(command.label.clone(), before, Arc::clone(&after))
                .with_command_id(command.id.clone());
            self.history.record(record);
        }

        self.publish(EngineEvent::DocumentChanged { document: after, reason }, follow_ups);
        if record_history {
            self.publish_history(follow_ups);
        }
        true
    }

    /// Run queued follow-up commands, bounded by `max_follow_up_rounds`
    fn drain(&mut self, mut follow_ups: FollowUps) {
        for _ in 0..self.config.max_follow_up_rounds {
            let queued = follow_ups.take();
            if queued.is_empty() {
                return;
            }
            for follow_up in queued {
                let reason = ChangeReason::Command {
                    label: follow_up.command.label.clone(),
                };
                self.execute_inner(
                    &follow_up.command,
                    follow_up.record_history,
                    reason,
                    &mut follow_ups,
                );
            }
        }
        if !follow_ups.is_empty() {
            warn!(
                dropped = follow_ups.len(),
                rounds = self.config.max_follow_up_rounds,
                "Dropping follow-up commands after round limit"
            );
        }
    }

    fn publish(&mut self, event: EngineEvent, follow_ups: &mut FollowUps) {
        self.subscribers.notify(&event, follow_ups);
    }

    fn publish_history(&mut self, follow_ups: &mut FollowUps) {
        let event = EngineEvent::HistoryChanged {
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
        };
        self.publish(event, follow_ups);
    }

    /// Restore `document` without touching history
    fn restore(&mut self, document: Arc<Document>, reason: ChangeReason) {
        debug!(reason = ?reason, nodes = document.len(), "Restoring document");
        self.document = Arc::clone(&document);
        let mut follow_ups = FollowUps::default();
        self.publish(EngineEvent::DocumentChanged { document, reason }, &mut follow_ups);
        self.publish_history(&mut follow_ups);
        self.drain(follow_ups);
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(document) => {
                self.restore(document, ChangeReason::Undo);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(document) => {
                self.restore(document, ChangeReason::Redo);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    /// Group subsequent recorded commands into one undo step
    pub fn begin_batch(&mut self, label: impl Into<String>) {
        self.history.begin_batch(label);
    }

    pub fn end_batch(&mut self) {
        let was_batching = self.history.is_batching();
        self.history.end_batch();
        if was_batching {
            let mut follow_ups = FollowUps::default();
            self.publish_history(&mut follow_ups);
            self.drain(follow_ups);
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        let mut follow_ups = FollowUps::default();
        self.publish_history(&mut follow_ups);
        self.drain(follow_ups);
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent, &mut FollowUps) + Send + 'static,
    {
        let handler: Handler = Box::new(handler);
        self.subscribers.subscribe(kind, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Replace the document with the renderer's flat structure view.
    ///
    /// IDs and child order are preserved; history is cleared.
    pub fn seed(&mut self, snapshot: RenderSnapshot) {
        let inputs = snapshot
            .nodes
            .into_iter()
            .map(|node| {
                let mut input = NodeInput::new(node.kind, node.name).with_id(node.id);
                input.parent_id = node.parent_id;
                input
            })
            .collect();
        let seeded = add_nodes(&Arc::new(Document::new()), inputs);
        let seeded = if self.config.synchronize_on_execute {
            self.effects.run(&seeded)
        } else {
            seeded
        };
        info!(nodes = seeded.len(), "Seeded document from render snapshot");
        self.history.clear();
        self.restore(seeded, ChangeReason::Seed);
    }

    pub fn export_robot(
        &self,
        root_id: &NodeId,
        options: &ExportOptions,
    ) -> Result<ExportOutput, EditorError> {
        let output = armature_urdf::export_robot(&self.document, root_id, options)?;
        Ok(output)
    }

    /// Parse robot-description text and add it to the document
    pub fn import_robot(
        &mut self,
        text: &str,
        options: ImportOptions,
    ) -> Result<ImportReport, EditorError> {
        let parsed = armature_urdf::parse_robot(text);
        let mut warnings = parsed.warnings;
        let Some(robot) = parsed.robot else {
            return Err(EditorError::Import { warnings });
        };

        let mut inputs = armature_urdf::robot_nodes(&robot);
        let Some(robot_id) = inputs.first().and_then(|input| input.id.clone()) else {
            return Err(EditorError::Import { warnings });
        };

        let target = match &options.parent_id {
            Some(parent_id) => match self.document.node(parent_id) {
                Some(parent) if parent.kind == NodeKind::Robot => Some(parent_id.clone()),
                Some(_) => {
                    warnings.push(format!(
                        "Import target {} is not a robot; importing as a new robot",
                        parent_id
                    ));
                    None
                }
                None => return Err(EditorError::NodeNotFound(parent_id.clone())),
            },
            None => None,
        };

        let root_id = match target {
            Some(target) => {
                inputs.remove(0);
                for input in &mut inputs {
                    if input.parent_id.as_ref() == Some(&robot_id) {
                        input.parent_id = Some(target.clone());
                    }
                }
                target
            }
            None => robot_id,
        };

        info!(
            robot = %robot.name,
            links = robot.links.len(),
            joints = robot.joints.len(),
            "Importing robot description"
        );
        let record = SourceRecord {
            name: robot.name.clone(),
            format: SourceFormat::Urdf,
            imported_at: Utc::now(),
        };
        let command = Command::new(format!("Import {}", robot.name), move |doc| {
            let next = add_nodes(doc, inputs.clone());
            if Arc::ptr_eq(&next, doc) {
                return next;
            }
            record_source(next, record.clone())
        });
        let execute = ExecuteOptions {
            record_history: options.record_history,
            reason: Some(ChangeReason::Import),
        };
        self.execute(command, execute);

        Ok(ImportReport { root_id, warnings })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Remember where imported content came from, keyed by source name
fn record_source(document: Arc<Document>, record: SourceRecord) -> Arc<Document> {
    let mut document = document;
    Arc::make_mut(&mut document).sources.insert(record.name.clone(), record);
    document
}

fn stamp(document: Arc<Document>) -> Arc<Document> {
    let mut document = document;
    Arc::make_mut(&mut document).metadata.updated_at = Utc::now();
    document
}
