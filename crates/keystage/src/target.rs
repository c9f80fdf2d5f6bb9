#![forbid(unsafe_code)]

//! Bookkeeping for one physical keyboard.

use std::collections::BTreeMap;

use tracing::error;

use crate::change::Change;
use crate::entries::SettingsBlock;
use crate::group::Group;
use crate::history::{History, HistoryConfig};
use crate::key::ChangeKey;
use crate::value::SlotValue;

/// All mutable change-tracking state of one target.
///
/// `staged` is the minimal diff between what the editors display and what
/// the device is believed to hold. `committed` remembers the last value
/// known to have reached the device, per slot. `baseline` holds the device
/// value each slot had when it was first edited.
#[derive(Debug, Clone, Default)]
pub struct TargetState {
    pub(crate) staged: BTreeMap<ChangeKey, Change>,
    pub(crate) committed: BTreeMap<ChangeKey, SlotValue>,
    pub(crate) baseline: BTreeMap<ChangeKey, SlotValue>,
    pub(crate) history: History,
    pub(crate) open_group: Option<Group>,
    pub(crate) immediate: bool,
}

impl TargetState {
    #[must_use]
    pub fn new(history: HistoryConfig, immediate: bool) -> Self {
        Self {
            staged: BTreeMap::new(),
            committed: BTreeMap::new(),
            baseline: BTreeMap::new(),
            history: History::new(history),
            open_group: None,
            immediate,
        }
    }

    /// Staged changes in key order.
    #[must_use]
    pub fn staged(&self) -> &BTreeMap<ChangeKey, Change> {
        &self.staged
    }

    /// Last value known to be on the device, per slot.
    #[must_use]
    pub fn committed(&self) -> &BTreeMap<ChangeKey, SlotValue> {
        &self.committed
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn open_group(&self) -> Option<&Group> {
        self.open_group.as_ref()
    }

    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    /// Forget every staged edit, committed value and history entry. The
    /// commit discipline is kept.
    pub fn reset(&mut self) {
        self.staged.clear();
        self.committed.clear();
        self.baseline.clear();
        self.history.clear();
        self.open_group = None;
    }

    /// Value the device is assumed to hold for the slot of `change`.
    ///
    /// The committed value wins, then the baseline, then the old value of an
    /// existing staged entry, then the change's own old value. Settings
    /// blocks resolve this per field, over the fields `change` touches.
    #[must_use]
    pub(crate) fn reference_value(&self, change: &Change) -> SlotValue {
        let key = change.key();
        let mut reference = change.old_slot();
        let known = [
            self.staged.get(&key).map(Change::old_slot),
            self.baseline.get(&key).cloned(),
            self.committed.get(&key).cloned(),
        ];
        for value in known.into_iter().flatten() {
            let value = value.restricted_to(&reference);
            reference.absorb(value);
        }
        reference
    }

    /// Remember the old value of `change` as the device value of its slot,
    /// unless one is already known. Settings blocks are tracked per field.
    pub(crate) fn note_baseline(&mut self, change: &Change) {
        let mut value = change.old_slot();
        if let Some(known) = self.baseline.get(&change.key()) {
            value.absorb(known.clone());
        }
        self.baseline.insert(change.key(), value);
    }

    /// Remember that `value` reached the device for `key`.
    pub(crate) fn record_committed(&mut self, key: ChangeKey, value: SlotValue) {
        match self.committed.get_mut(&key) {
            Some(committed) => committed.absorb(value),
            None => {
                self.committed.insert(key, value);
            }
        }
    }

    /// Recompute the staged entry for the slot of `change`, given that the
    /// display now holds `local` for it.
    ///
    /// The entry is dropped when `local` matches the reference value and
    /// otherwise rewritten to `reference -> local`.
    pub(crate) fn settle(&mut self, change: &Change, local: SlotValue) {
        let key = change.key();
        let reference = self.reference_value(change);
        match (local, reference) {
            (SlotValue::Settings(local), SlotValue::Settings(reference)) => {
                self.settle_fields(change, &local, &reference);
            }
            (local, reference) if local == reference => {
                self.staged.remove(&key);
            }
            (local, reference) => self.restage(change, reference, local),
        }
    }

    fn settle_fields(&mut self, change: &Change, local: &SettingsBlock, reference: &SettingsBlock) {
        let key = change.key();
        let (mut old, mut new) = match self.staged.get(&key) {
            Some(staged) => (
                SettingsBlock::try_from(staged.old_slot()).unwrap_or_default(),
                SettingsBlock::try_from(staged.new_slot()).unwrap_or_default(),
            ),
            None => (SettingsBlock::new(), SettingsBlock::new()),
        };
        for (field, value) in local.fields() {
            match reference.get(field) {
                Some(device) if device != value => {
                    old.insert(field, device);
                    new.insert(field, value);
                }
                _ => {
                    old.remove(field);
                    new.remove(field);
                }
            }
        }
        if new.is_empty() {
            self.staged.remove(&key);
        } else {
            self.restage(change, SlotValue::Settings(old), SlotValue::Settings(new));
        }
    }

    fn restage(&mut self, change: &Change, old: SlotValue, new: SlotValue) {
        match change.rebased(old, new) {
            Ok(rebased) => {
                self.staged.insert(change.key(), rebased);
            }
            Err(err) => error!(key = %change.key(), %err, "cannot restage change"),
        }
    }
}
