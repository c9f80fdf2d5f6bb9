#![forbid(unsafe_code)]

//! Undo/redo units.
//!
//! A [`Group`] is an ordered set of changes that undo and redo together.
//! Single edits get a singleton group named "Change"; multi-slot operations
//! ("Fill layer", "Paste layer") bracket their edits into one named group.
//!
//! # Invariants
//!
//! 1. At most one change per key. Adding a change for a key already present
//!    merges into the existing entry, which keeps its position.
//! 2. `apply` visits changes in insertion order and `revert` in reverse
//!    order. Both visit every member even after a rejection and never roll
//!    back members already written.
//! 3. Once filed into history a group is not mutated.

use std::collections::HashMap;
use std::fmt;

use web_time::Instant;

use crate::change::Change;
use crate::error::ChangeError;
use crate::key::ChangeKey;
use crate::keyboard::Keyboard;

/// Name given to the implicit group wrapping a single staged edit.
pub const SINGLE_CHANGE_GROUP: &str = "Change";

/// Metadata attached to a group.
#[derive(Debug, Clone)]
pub struct GroupMetadata {
    /// Label shown in undo/redo menus.
    pub name: String,
    /// When the group was opened.
    pub timestamp: Instant,
}

impl GroupMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Instant::now(),
        }
    }
}

/// One undo/redo unit.
#[derive(Clone)]
pub struct Group {
    /// Changes in insertion order.
    changes: Vec<Change>,
    /// Position of each key in `changes`.
    index: HashMap<ChangeKey, usize>,
    metadata: GroupMetadata,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.metadata.name)
            .field("changes", &self.changes)
            .finish_non_exhaustive()
    }
}

impl Group {
    /// Create an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            changes: Vec::new(),
            index: HashMap::new(),
            metadata: GroupMetadata::new(name),
        }
    }

    /// Singleton group for one edit outside any bracket.
    #[must_use]
    pub fn single(change: Change) -> Self {
        let mut group = Self::new(SINGLE_CHANGE_GROUP);
        group.index.insert(change.key(), 0);
        group.changes.push(change);
        group
    }

    /// Add a change, merging into an existing entry for the same key.
    ///
    /// On error the group is unchanged.
    pub fn add(&mut self, change: Change) -> Result<(), ChangeError> {
        let key = change.key();
        match self.index.get(&key) {
            Some(&position) => self.changes[position].merge(&change),
            None => {
                self.index.insert(key, self.changes.len());
                self.changes.push(change);
                Ok(())
            }
        }
    }

    /// Write every new value to the device, oldest first.
    ///
    /// Returns `true` only if every write was accepted.
    pub fn apply(&self, keyboard: &mut Keyboard) -> bool {
        let mut accepted = true;
        for change in &self.changes {
            accepted &= change.apply(keyboard);
        }
        accepted
    }

    /// Write every old value to the device, newest first.
    ///
    /// Returns `true` only if every write was accepted.
    pub fn revert(&self, keyboard: &mut Keyboard) -> bool {
        let mut accepted = true;
        for change in self.changes.iter().rev() {
            accepted &= change.revert(keyboard);
        }
        accepted
    }

    #[must_use]
    pub fn get(&self, key: &ChangeKey) -> Option<&Change> {
        self.index.get(key).map(|&position| &self.changes[position])
    }

    #[must_use]
    pub fn contains(&self, key: &ChangeKey) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = ChangeKey> + '_ {
        self.changes.iter().map(Change::key)
    }

    /// Changes in insertion order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[must_use]
    pub fn metadata(&self) -> &GroupMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{KeymapChange, QmkSettingChange};
    use crate::key::TargetId;
    use crate::keyboard::KeyboardView;
    use crate::memory_device::{DeviceWrite, MemoryDevice};
    use crate::value::SlotValue;

    fn key_change(col: u8, old: u16, new: u16) -> Change {
        KeymapChange::new(0, 0, col, old, new).into()
    }

    #[test]
    fn add_dedupes_by_key_and_keeps_position() {
        let mut group = Group::new("Fill layer");
        group.add(key_change(0, 1, 2)).unwrap();
        group.add(key_change(1, 1, 2)).unwrap();
        group.add(key_change(0, 2, 3)).unwrap();

        assert_eq!(group.len(), 2);
        assert_eq!(
            group.keys().collect::<Vec<_>>(),
            vec![ChangeKey::keymap(0, 0, 0), ChangeKey::keymap(0, 0, 1)]
        );
        let merged = group.get(&ChangeKey::keymap(0, 0, 0)).unwrap();
        assert_eq!(merged.old_slot(), SlotValue::Keycode(1));
        assert_eq!(merged.new_slot(), SlotValue::Keycode(3));
    }

    #[test]
    fn single_group_is_named_change() {
        let group = Group::single(key_change(4, 0, 1));
        assert_eq!(group.name(), SINGLE_CHANGE_GROUP);
        assert!(group.contains(&ChangeKey::keymap(0, 0, 4)));
        assert!(!group.is_empty());
    }

    #[test]
    fn apply_forward_revert_backward() {
        let device = MemoryDevice::new();
        let mut kb = Keyboard::new(TargetId::new(1), KeyboardView::default(), device.clone());
        let mut group = Group::new("Paste");
        group.add(key_change(0, 10, 11)).unwrap();
        group.add(QmkSettingChange::new(3, 5, 6).into()).unwrap();

        assert!(group.apply(&mut kb));
        assert!(group.revert(&mut kb));
        assert_eq!(
            device.writes(),
            vec![
                DeviceWrite::Key {
                    layer: 0,
                    row: 0,
                    col: 0,
                    keycode: 11
                },
                DeviceWrite::QmkSetting { qsid: 3, value: 6 },
                DeviceWrite::QmkSetting { qsid: 3, value: 5 },
                DeviceWrite::Key {
                    layer: 0,
                    row: 0,
                    col: 0,
                    keycode: 10
                },
            ]
        );
    }

    #[test]
    fn apply_visits_every_member_after_rejection() {
        let device = MemoryDevice::new();
        device.reject_category("keymap");
        let mut kb = Keyboard::new(TargetId::new(1), KeyboardView::default(), device.clone());
        let mut group = Group::new("Mixed");
        group.add(key_change(0, 0, 1)).unwrap();
        group.add(QmkSettingChange::new(3, 0, 1).into()).unwrap();

        assert!(!group.apply(&mut kb));
        assert_eq!(device.rejected_count(), 1);
        assert_eq!(device.setting(3), Some(1));
    }

    #[test]
    fn distinct_categories_never_merge() {
        use crate::changes::LayerColorChange;
        use crate::entries::Hsv;

        let mut group = Group::new("Colors");
        group
            .add(LayerColorChange::new(1, Hsv::new(0, 0, 0), Hsv::new(1, 1, 1)).into())
            .unwrap();
        let before = group.changes().to_vec();
        group.add(QmkSettingChange::new(1, 0, 1).into()).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.changes()[0], before[0]);
    }
}
