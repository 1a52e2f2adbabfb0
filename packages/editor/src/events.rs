//! Engine notifications and subscriber bookkeeping.

use crate::command::Command;
use armature_scene::Document;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    DocumentChanged,
    HistoryChanged,
}

/// Why the document changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    Command { label: String },
    Undo,
    Redo,
    Seed,
    Import,
    Other(String),
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    DocumentChanged {
        document: Arc<Document>,
        reason: ChangeReason,
    },
    HistoryChanged {
        can_undo: bool,
        can_redo: bool,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::DocumentChanged { .. } => EventKind::DocumentChanged,
            EngineEvent::HistoryChanged { .. } => EventKind::HistoryChanged,
        }
    }
}

/// Commands a subscriber wants executed once notification finishes
#[derive(Debug, Default)]
pub struct FollowUps {
    queued: Vec<FollowUp>,
}

#[derive(Debug, Clone)]
pub(crate) struct FollowUp {
    pub command: Command,
    pub record_history: bool,
}

impl FollowUps {
    /// Queue a recorded follow-up
    pub fn push(&mut self, command: impl Into<Command>) {
        self.queued.push(FollowUp {
            command: command.into(),
            record_history: true,
        });
    }

    /// Queue a follow-up that bypasses history
    pub fn push_unrecorded(&mut self, command: impl Into<Command>) {
        self.queued.push(FollowUp {
            command: command.into(),
            record_history: false,
        });
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<FollowUp> {
        std::mem::take(&mut self.queued)
    }
}

pub type Handler = Box<dyn FnMut(&EngineEvent, &mut FollowUps) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Listener registry keyed by subscription, notified in subscription order
#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    handlers: BTreeMap<SubscriptionId, (EventKind, Handler)>,
}

impl Subscribers {
    pub fn subscribe(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.insert(id, (kind, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn notify(&mut self, event: &EngineEvent, follow_ups: &mut FollowUps) {
        let kind = event.kind();
        for (handler_kind, handler) in self.handlers.values_mut() {
            if *handler_kind == kind {
                handler(event, follow_ups);
            }
        }
    }
}
