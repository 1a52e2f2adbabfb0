//! # Undo/Redo Stack
//!
//! Tracks document history as snapshot pairs and enables undo/redo.
//!
//! ## Design
//!
//! - Each recorded command stores the document before and after it ran
//! - Undo restores `before` and moves the record to the redo stack
//! - Redo restores `after`
//! - New records clear the redo stack
//! - Supports batched operations (group several commands as one undo step)
//!
//! Snapshots share unchanged nodes through `Arc`, so a record costs roughly
//! the nodes its command touched.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! stack.record(HistoryRecord::new("Rename", before, after));
//!
//! let restored = stack.undo(); // Some(before)
//! let reapplied = stack.redo(); // Some(after)
//! ```

use armature_scene::Document;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of undo levels kept
pub const DEFAULT_MAX_LEVELS: usize = 100;

/// One undoable step
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub label: String,

    /// ID of the command that produced this record, if any
    pub command_id: Option<String>,

    pub before: Arc<Document>,
    pub after: Arc<Document>,

    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(label: impl Into<String>, before: Arc<Document>, after: Arc<Document>) -> Self {
        Self {
            label: label.into(),
            command_id: None,
            before,
            after,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_command_id(mut self, id: impl Into<String>) -> Self {
        self.command_id = Some(id.into());
        self
    }
}

/// Undo/redo stack for document editing
#[derive(Debug)]
pub struct UndoStack {
    /// Applied records (most recent last)
    undo_stack: VecDeque<HistoryRecord>,

    /// Undone records (most recent last)
    redo_stack: Vec<HistoryRecord>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Currently building a batch
    current_batch: Option<HistoryRecord>,

    /// Label applied to the batch when it closes
    batch_label: Option<String>,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_MAX_LEVELS)
    }

    /// Create an undo stack with custom max levels
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
            batch_label: None,
        }
    }

    /// Record a completed step
    pub fn record(&mut self, record: HistoryRecord) {
        if self.batch_label.is_some() {
            match &mut self.current_batch {
                Some(batch) => {
                    batch.after = record.after;
                    batch.recorded_at = record.recorded_at;
                }
                None => self.current_batch = Some(record),
            }
            return;
        }
        self.push_record(record);
    }

    /// Start a batch of records (will be undone/redone together)
    pub fn begin_batch(&mut self, label: impl Into<String>) {
        self.end_batch();
        self.batch_label = Some(label.into());
    }

    /// End the current batch and push to undo stack
    pub fn end_batch(&mut self) {
        let label = self.batch_label.take();
        if let Some(mut batch) = self.current_batch.take() {
            if let Some(label) = label {
                batch.label = label;
            }
            self.push_record(batch);
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batch_label.is_some()
    }

    fn push_record(&mut self, record: HistoryRecord) {
        self.undo_stack.push_back(record);

        // Trim if exceeded max levels
        if self.max_levels > 0 {
            while self.undo_stack.len() > self.max_levels {
                self.undo_stack.pop_front();
            }
        }

        // New action invalidates the future
        self.redo_stack.clear();
    }

    /// Undo the most recent record; returns the document to restore
    pub fn undo(&mut self) -> Option<Arc<Document>> {
        self.end_batch();
        let record = self.undo_stack.pop_back()?;
        let before = Arc::clone(&record.before);
        self.redo_stack.push(record);
        Some(before)
    }

    /// Redo the most recently undone record; returns the document to restore
    pub fn redo(&mut self) -> Option<Arc<Document>> {
        self.end_batch();
        let record = self.redo_stack.pop()?;
        let after = Arc::clone(&record.after);
        self.undo_stack.push_back(record);
        Some(after)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.current_batch.is_some()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Get the number of undo levels available
    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the number of redo levels available
    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
        self.batch_label = None;
    }

    /// Label of the next undo operation
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.back().map(|record| record.label.as_str())
    }

    /// Label of the next redo operation
    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|record| record.label.as_str())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
