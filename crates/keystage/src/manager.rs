#![forbid(unsafe_code)]

//! The change manager.
//!
//! [`ChangeManager`] is an explicitly constructed context object. It owns the
//! active [`Keyboard`], one [`TargetState`] per keyboard identity it has
//! seen, and the [`EventBus`] editors subscribe to.
//!
//! # Commit disciplines
//!
//! - **Deferred** (default): edits are staged locally and reach the device
//!   on [`ChangeManager::push`]. Undo and redo only rewrite the display and
//!   recompute the staged diff.
//! - **Immediate**: every edit, undo and redo is written to the device as it
//!   happens. Successful writes update the committed values; rejected ones
//!   leave the slot staged so a later push can retry it.
//!
//! # Staged-diff recompute
//!
//! After undo or redo moves a slot's display value to `L`, the manager
//! compares `L` with the reference value: the committed value, else the
//! slot's baseline (the old value of its first edit), else the staged old
//! value, else the change's old value. Equal means the slot is back in sync
//! and its staged entry is dropped; otherwise the entry becomes
//! `reference -> L`. For undo, `L` is the newest value still recorded for
//! the slot on the undo stack, falling back to the change's old value.
//!
//! # Events
//!
//! Every mutating operation ends with one dispatch: the de-duplicated state
//! notifications, `StateChanged`, then `ValuesRestored` or `Pushed` when the
//! operation produces one. Handlers run after state is fully updated.
//!
//! Handlers cannot borrow the manager while it dispatches. Edits they push
//! onto the [`EditQueue`] from [`ChangeManager::edit_queue`] are staged once
//! the dispatch returns, each with its own notifications.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, debug_span, info, warn};

use crate::change::Change;
use crate::config::ManagerConfig;
use crate::error::{ChangeError, ConfigError};
use crate::events::{
    ChangeEvent, EditQueue, EmittedState, EventBus, MAX_QUEUED_EDITS, Subscription,
};
use crate::group::Group;
use crate::history::HistoryEntry;
use crate::key::{ChangeKey, TargetId};
use crate::keyboard::Keyboard;
use crate::target::TargetState;
use crate::value::SlotValue;

/// Direction of a device write made on behalf of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Write {
    /// Write the change's new value.
    Apply,
    /// Write the change's old value.
    Revert,
}

/// Change tracking, undo/redo and commit orchestration for keyboards.
#[derive(Debug)]
pub struct ChangeManager {
    config: ManagerConfig,
    keyboard: Option<Keyboard>,
    targets: HashMap<TargetId, TargetState>,
    events: EventBus,
    emitted: EmittedState,
    queue: EditQueue,
    /// Set while queued edits are being staged.
    draining: bool,
}

impl Default for ChangeManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl ChangeManager {
    /// Create a manager. An undo depth of zero is raised to one.
    #[must_use]
    pub fn new(mut config: ManagerConfig) -> Self {
        if config.max_undo_depth == 0 {
            warn!("max_undo_depth of 0 would evict every group, using 1");
            config.max_undo_depth = 1;
        }
        Self {
            config,
            keyboard: None,
            targets: HashMap::new(),
            events: EventBus::new(),
            emitted: EmittedState::default(),
            queue: EditQueue::new(),
            draining: false,
        }
    }

    /// Create a manager, rejecting a configuration that fails
    /// [`ManagerConfig::validate`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Validation`] listing every invalid parameter.
    pub fn try_new(config: ManagerConfig) -> Result<Self, ConfigError> {
        let errors = config.validate();
        if errors.is_empty() {
            Ok(Self::new(config))
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Event bus for this manager. Clones share subscribers.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register an event handler; see [`EventBus::subscribe`].
    pub fn subscribe(&self, callback: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        self.events.subscribe(callback)
    }

    /// Handle for staging edits from inside event handlers.
    ///
    /// Queued edits are staged in order after the current dispatch, against
    /// whichever keyboard is active at that point.
    #[must_use]
    pub fn edit_queue(&self) -> EditQueue {
        self.queue.clone()
    }

    // ========================================================================
    // Targets
    // ========================================================================

    /// Make `keyboard` the active target, or deactivate with `None`.
    ///
    /// State for a keyboard identity is created on first sight and kept
    /// across switches. Returns the previously active keyboard.
    pub fn set_active_target(&mut self, keyboard: Option<Keyboard>) -> Option<Keyboard> {
        let previous = std::mem::replace(&mut self.keyboard, keyboard);
        if let Some(id) = self.active_target() {
            let config = self.config;
            self.targets.entry(id).or_insert_with(|| {
                debug!(keyboard = %id, "tracking new keyboard");
                TargetState::new(config.history_config(), config.immediate_by_default)
            });
        }
        debug!(keyboard = ?self.active_target(), "active keyboard switched");
        self.emit_state_changes(None);
        previous
    }

    /// Forget the active keyboard's state entirely and hand the keyboard back.
    pub fn disconnect(&mut self) -> Option<Keyboard> {
        let keyboard = self.keyboard.take()?;
        self.targets.remove(&keyboard.id());
        debug!(keyboard = %keyboard.id(), "keyboard disconnected");
        self.emit_state_changes(None);
        Some(keyboard)
    }

    #[must_use]
    pub fn active_target(&self) -> Option<TargetId> {
        self.keyboard.as_ref().map(Keyboard::id)
    }

    #[must_use]
    pub fn keyboard(&self) -> Option<&Keyboard> {
        self.keyboard.as_ref()
    }

    /// Mutable access for editors updating the display state.
    pub fn keyboard_mut(&mut self) -> Option<&mut Keyboard> {
        self.keyboard.as_mut()
    }

    /// State tracked for any known target, active or not.
    #[must_use]
    pub fn target_state(&self, id: TargetId) -> Option<&TargetState> {
        self.targets.get(&id)
    }

    fn active(&self) -> Option<&TargetState> {
        self.targets.get(&self.active_target()?)
    }

    fn active_parts(&mut self) -> Option<(&mut Keyboard, &mut TargetState)> {
        let keyboard = self.keyboard.as_mut()?;
        let config = self.config;
        let state = self.targets.entry(keyboard.id()).or_insert_with(|| {
            TargetState::new(config.history_config(), config.immediate_by_default)
        });
        Some((keyboard, state))
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Open a named group. Ignored while a group is already open.
    pub fn begin_group(&mut self, name: &str) {
        let Some((_, state)) = self.active_parts() else {
            return;
        };
        if state.open_group.is_none() {
            debug!(group = name, "group opened");
            state.open_group = Some(Group::new(name));
        }
    }

    /// Close the open group and file it into history if it holds anything.
    ///
    /// In immediate discipline every member is written to the device.
    pub fn end_group(&mut self) {
        let Some((keyboard, state)) = self.active_parts() else {
            return;
        };
        let Some(group) = state.open_group.take() else {
            return;
        };
        if group.is_empty() {
            debug!(group = group.name(), "empty group discarded");
        } else {
            debug!(
                group = group.name(),
                changes = group.len(),
                depth = state.history.undo_depth() + 1,
                "group filed"
            );
            if state.immediate {
                for change in group.changes() {
                    write_through(keyboard, state, change, Write::Apply);
                }
            }
            state.history.record(group);
        }
        self.emit_state_changes(None);
    }

    /// Record an edit the user just made.
    ///
    /// The edit is folded into the staged diff and filed into history: into
    /// the open group if there is one, otherwise as its own group. With no
    /// active keyboard this does nothing.
    ///
    /// # Errors
    ///
    /// [`ChangeError::IncompatibleMerge`] if the edit cannot be folded into
    /// the existing entry for its key. State is untouched in that case.
    pub fn stage(&mut self, change: impl Into<Change>) -> Result<(), ChangeError> {
        let change = change.into();
        let Some((keyboard, state)) = self.active_parts() else {
            return Ok(());
        };
        let key = change.key();

        let merged = match state.staged.get(&key) {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.merge(&change)?;
                merged
            }
            None => change.clone(),
        };
        if let Some(group) = state.open_group.as_mut() {
            group.add(change.clone())?;
        }
        state.note_baseline(&change);
        state.staged.insert(key.clone(), merged);
        state.settle(&change, change.new_slot());
        state.history.clear_redo();

        if state.open_group.is_none() {
            state.history.record(Group::single(change.clone()));
            if state.immediate {
                write_through(keyboard, state, &change, Write::Apply);
            }
        }
        debug!(
            key = %key,
            group = state.open_group.as_ref().map(Group::name),
            depth = state.history.undo_depth(),
            "change staged"
        );
        self.emit_state_changes(None);
        Ok(())
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Step back one group. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some((keyboard, state)) = self.active_parts() else {
            return false;
        };
        let Some(group) = state.history.step_back() else {
            return false;
        };
        let mut restored = BTreeSet::new();
        for change in group.changes() {
            restored.insert(change.key());
            change.restore_local(&mut keyboard.view, true);
            if state.immediate {
                write_through(keyboard, state, change, Write::Revert);
            } else {
                let local = state.history.value_after(&change.key(), change.old_slot());
                state.settle(change, local);
            }
        }
        debug!(
            group = group.name(),
            changes = group.len(),
            depth = state.history.undo_depth(),
            "undo"
        );
        self.emit_state_changes(Some(ChangeEvent::ValuesRestored(restored)));
        true
    }

    /// Step forward one group. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some((keyboard, state)) = self.active_parts() else {
            return false;
        };
        let Some(group) = state.history.step_forward() else {
            return false;
        };
        let mut restored = BTreeSet::new();
        for change in group.changes() {
            restored.insert(change.key());
            change.restore_local(&mut keyboard.view, false);
            if state.immediate {
                write_through(keyboard, state, change, Write::Apply);
            } else {
                state.settle(change, change.new_slot());
            }
        }
        debug!(
            group = group.name(),
            changes = group.len(),
            depth = state.history.undo_depth(),
            "redo"
        );
        self.emit_state_changes(Some(ChangeEvent::ValuesRestored(restored)));
        true
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Write every staged change to the device.
    ///
    /// Only when every write is accepted are the new values recorded as
    /// committed and the staged diff cleared. On any rejection nothing is
    /// recorded and `false` is returned; writes accepted before the
    /// rejection are not rolled back. Returns `false` with no active
    /// keyboard.
    pub fn push(&mut self) -> bool {
        let Some((keyboard, state)) = self.active_parts() else {
            return false;
        };
        if state.staged.is_empty() {
            return true;
        }
        let _span = debug_span!("push", keyboard = %keyboard.id(), changes = state.staged.len())
            .entered();

        let mut accepted = true;
        for change in state.staged.values() {
            if !change.apply(keyboard) {
                warn!(key = %change.key(), "device rejected staged change");
                accepted = false;
            }
        }
        if !accepted {
            warn!("push incomplete, staged changes kept");
            return false;
        }

        let pushed = std::mem::take(&mut state.staged);
        info!(count = pushed.len(), "staged changes pushed");
        for (key, change) in pushed {
            state.record_committed(key, change.new_slot());
        }
        self.emit_state_changes(Some(ChangeEvent::Pushed));
        true
    }

    /// Switch the commit discipline.
    ///
    /// Turning immediate discipline on first pushes anything staged. The
    /// flag is set even if that push fails; the rejected entries stay staged.
    pub fn toggle_immediate(&mut self, on: bool) {
        let Some((_, state)) = self.active_parts() else {
            return;
        };
        if state.immediate == on {
            return;
        }
        let flush = on && !state.staged.is_empty();
        // Queued edits wait until the new discipline is in place.
        let draining = std::mem::replace(&mut self.draining, true);
        let flushed = !flush || self.push();
        self.draining = draining;
        if !flushed {
            warn!("implicit push before immediate discipline failed");
        }
        if let Some((_, state)) = self.active_parts() {
            state.immediate = on;
        }
        debug!(immediate = on, "commit discipline changed");
        self.emit_state_changes(None);
    }

    /// Drop every staged change and all history. Committed values and
    /// baselines are kept.
    pub fn discard_all(&mut self) {
        let Some((_, state)) = self.active_parts() else {
            return;
        };
        state.staged.clear();
        state.history.clear();
        state.open_group = None;
        debug!("staged changes discarded");
        self.emit_state_changes(None);
    }

    /// Put every staged slot back to its device value in the display, then
    /// forget staged changes, committed values and history.
    pub fn revert_all(&mut self) {
        let Some((keyboard, state)) = self.active_parts() else {
            return;
        };
        let mut restored = BTreeSet::new();
        for (key, change) in &state.staged {
            change.restore_local(&mut keyboard.view, true);
            restored.insert(key.clone());
        }
        state.reset();
        debug!(count = restored.len(), "staged changes reverted");
        self.emit_state_changes(Some(ChangeEvent::ValuesRestored(restored)));
    }

    /// Reset the active keyboard's state: staged, committed, history and any
    /// open group. The commit discipline is kept.
    pub fn clear(&mut self) {
        let Some((_, state)) = self.active_parts() else {
            return;
        };
        state.reset();
        self.emit_state_changes(None);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.active().is_some_and(|s| s.history.can_undo())
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.active().is_some_and(|s| s.history.can_redo())
    }

    /// Whether a push would send anything. Always `false` in immediate
    /// discipline.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.deferred().is_some_and(|s| !s.staged.is_empty())
    }

    #[must_use]
    pub fn is_modified(&self, key: &ChangeKey) -> bool {
        self.deferred().is_some_and(|s| s.staged.contains_key(key))
    }

    /// Value staged for `key`, if it differs from the device.
    #[must_use]
    pub fn pending_value(&self, key: &ChangeKey) -> Option<SlotValue> {
        self.deferred()?.staged.get(key).map(Change::new_slot)
    }

    #[must_use]
    pub fn modified_keys(&self) -> BTreeSet<ChangeKey> {
        self.deferred()
            .map(|s| s.staged.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of staged entries, in either discipline.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.active().map_or(0, |s| s.staged.len())
    }

    /// The staged change for `key`, in either discipline.
    #[must_use]
    pub fn staged_change(&self, key: &ChangeKey) -> Option<&Change> {
        self.active()?.staged.get(key)
    }

    #[must_use]
    pub fn committed_value(&self, key: &ChangeKey) -> Option<&SlotValue> {
        self.active()?.committed.get(key)
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.active().map_or(0, |s| s.history.undo_depth())
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.active().map_or(0, |s| s.history.redo_depth())
    }

    #[must_use]
    pub fn max_undo_depth(&self) -> usize {
        self.config.max_undo_depth
    }

    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.active().is_some_and(|s| s.immediate)
    }

    #[must_use]
    pub fn next_undo_name(&self) -> Option<&str> {
        self.active()?.history.next_undo_name()
    }

    #[must_use]
    pub fn next_redo_name(&self) -> Option<&str> {
        self.active()?.history.next_redo_name()
    }

    /// Undo labels, most recent first.
    #[must_use]
    pub fn undo_names(&self, limit: usize) -> Vec<&str> {
        self.active()
            .map(|s| s.history.undo_names(limit))
            .unwrap_or_default()
    }

    /// Redo labels, most recent first.
    #[must_use]
    pub fn redo_names(&self, limit: usize) -> Vec<&str> {
        self.active()
            .map(|s| s.history.redo_names(limit))
            .unwrap_or_default()
    }

    /// Undoable groups with their size and opening time, most recent first.
    #[must_use]
    pub fn undo_entries(&self, limit: usize) -> Vec<HistoryEntry<'_>> {
        self.active()
            .map(|s| s.history.undo_entries(limit))
            .unwrap_or_default()
    }

    /// Redoable groups with their size and opening time, most recent first.
    #[must_use]
    pub fn redo_entries(&self, limit: usize) -> Vec<HistoryEntry<'_>> {
        self.active()
            .map(|s| s.history.redo_entries(limit))
            .unwrap_or_default()
    }

    fn deferred(&self) -> Option<&TargetState> {
        self.active().filter(|s| !s.immediate)
    }

    fn emit_state_changes(&mut self, extra: Option<ChangeEvent>) {
        let next = EmittedState {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            can_push: self.has_pending_changes(),
            immediate: self.is_immediate(),
            modified_keys: self.modified_keys(),
        };
        let mut events = self.emitted.update(next);
        events.extend(extra);
        self.events.emit_all(&events);
        self.stage_queued_edits();
    }

    /// Stage edits handlers queued during dispatch. Each staged edit emits
    /// again, so the guard keeps a nested drain from starting and the count
    /// caps handlers that keep queueing.
    fn stage_queued_edits(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        let mut staged = 0;
        while let Some(change) = self.queue.pop() {
            if staged == MAX_QUEUED_EDITS {
                let dropped = self.queue.clear() + 1;
                warn!(dropped, limit = MAX_QUEUED_EDITS, "queued edit limit reached");
                break;
            }
            staged += 1;
            if let Err(err) = self.stage(change) {
                warn!(%err, "queued edit not staged");
            }
        }
        self.draining = false;
    }
}

/// Write one change to the device in immediate discipline and settle its
/// staged entry against the outcome.
fn write_through(keyboard: &mut Keyboard, state: &mut TargetState, change: &Change, write: Write) {
    let (accepted, written) = match write {
        Write::Apply => (change.apply(keyboard), change.new_slot()),
        Write::Revert => (change.revert(keyboard), change.old_slot()),
    };
    if accepted {
        state.record_committed(change.key(), written.clone());
    } else {
        warn!(key = %change.key(), ?write, "device rejected immediate write, slot stays staged");
    }
    state.settle(change, written);
}
