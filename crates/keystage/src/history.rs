#![forbid(unsafe_code)]

//! Bounded undo/redo stacks of [`Group`]s.
//!
//! # Invariants
//!
//! 1. `undo_depth() <= config.max_depth` after every operation.
//! 2. Filing a new group with [`History::record`] clears the redo stack.
//! 3. Groups move between the stacks unchanged.
//!
//! Groups are stored in `VecDeque`s (newest at the back) so that evicting the
//! oldest group is O(1).
//!
//! ```text
//! record(g3)            undo() x1             record(g4)
//! undo: [g1, g2, g3]    undo: [g1, g2]        undo: [g1, g2, g4]
//! redo: []              redo: [g3]            redo: []
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::trace;
use web_time::Instant;

use crate::group::Group;
use crate::key::ChangeKey;
use crate::value::SlotValue;

/// Default number of groups kept on the undo stack.
pub const DEFAULT_MAX_DEPTH: usize = 1500;

/// Limits for a [`History`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of groups on the undo stack.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

/// Summary of one filed group for history menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry<'a> {
    pub name: &'a str,
    /// Number of slots the group touches.
    pub changes: usize,
    /// When the group was opened.
    pub opened_at: Instant,
}

impl<'a> HistoryEntry<'a> {
    fn of(group: &'a Group) -> Self {
        Self {
            name: group.name(),
            changes: group.len(),
            opened_at: group.metadata().timestamp,
        }
    }
}

/// Undo and redo stacks for one target.
#[derive(Clone, Default)]
pub struct History {
    /// Groups available for undo (newest at back).
    undo_stack: VecDeque<Group>,
    /// Groups available for redo (newest at back).
    redo_stack: VecDeque<Group>,
    config: HistoryConfig,
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("config", &self.config)
            .finish()
    }
}

impl History {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            config,
        }
    }

    // ========================================================================
    // Stack movement
    // ========================================================================

    /// File a freshly completed group. Clears the redo stack.
    pub fn record(&mut self, group: Group) {
        self.redo_stack.clear();
        self.undo_stack.push_back(group);
        self.enforce_limits();
    }

    /// Take the newest undoable group and file it for redo.
    ///
    /// Returns a copy of the moved group.
    pub fn step_back(&mut self) -> Option<Group> {
        let group = self.undo_stack.pop_back()?;
        self.redo_stack.push_back(group.clone());
        Some(group)
    }

    /// Take the newest redoable group and file it back for undo.
    ///
    /// Returns a copy of the moved group.
    pub fn step_forward(&mut self) -> Option<Group> {
        let group = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(group.clone());
        self.enforce_limits();
        Some(group)
    }

    /// Value `key` displays once everything above the undo stack's newest
    /// change to it has been undone.
    ///
    /// Walks the undo stack oldest to newest and folds in the new value of
    /// every change to `key`, so the newest edit wins (per field for
    /// settings blocks). Fields no change touched keep `fallback`.
    #[must_use]
    pub fn value_after(&self, key: &ChangeKey, fallback: SlotValue) -> SlotValue {
        let mut value = fallback;
        for change in self.undo_stack.iter().filter_map(|group| group.get(key)) {
            let newer = change.new_slot().restricted_to(&value);
            value.absorb(newer);
        }
        value
    }

    // ========================================================================
    // Info
    // ========================================================================

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.config.max_depth
    }

    /// Names of undoable groups, most recent first.
    pub fn undo_names(&self, limit: usize) -> Vec<&str> {
        self.undo_stack
            .iter()
            .rev()
            .take(limit)
            .map(Group::name)
            .collect()
    }

    /// Names of redoable groups, most recent first.
    pub fn redo_names(&self, limit: usize) -> Vec<&str> {
        self.redo_stack
            .iter()
            .rev()
            .take(limit)
            .map(Group::name)
            .collect()
    }

    /// Undoable groups, most recent first.
    pub fn undo_entries(&self, limit: usize) -> Vec<HistoryEntry<'_>> {
        self.undo_stack
            .iter()
            .rev()
            .take(limit)
            .map(HistoryEntry::of)
            .collect()
    }

    /// Redoable groups, most recent first.
    pub fn redo_entries(&self, limit: usize) -> Vec<HistoryEntry<'_>> {
        self.redo_stack
            .iter()
            .rev()
            .take(limit)
            .map(HistoryEntry::of)
            .collect()
    }

    #[must_use]
    pub fn next_undo_name(&self) -> Option<&str> {
        self.undo_stack.back().map(Group::name)
    }

    #[must_use]
    pub fn next_redo_name(&self) -> Option<&str> {
        self.redo_stack.back().map(Group::name)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop both stacks.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn clear_redo(&mut self) {
        self.redo_stack.clear();
    }

    fn enforce_limits(&mut self) {
        while self.undo_stack.len() > self.config.max_depth {
            if let Some(evicted) = self.undo_stack.pop_front() {
                trace!(
                    group = evicted.name(),
                    changes = evicted.len(),
                    max_depth = self.config.max_depth,
                    "evicted oldest undo group"
                );
            }
        }
    }
}
