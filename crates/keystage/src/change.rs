#![forbid(unsafe_code)]

//! The change contract.
//!
//! A change is one edit of one slot: it knows its [`ChangeKey`], holds an old
//! and a new snapshot, can push either snapshot to the device, can restore
//! either snapshot into the local view, and can fold a newer edit of the same
//! slot into itself.
//!
//! Concrete edits implement [`SlotEdit`]; the closed set of edits the manager
//! tracks is the [`Change`] enum, which dispatches to them.
//!
//! # Invariants
//!
//! - `key()` is stable for the lifetime of a change.
//! - Snapshots are owned values; a change never aliases editor state.
//! - `merge()` keeps the first old value and takes the latest new value
//!   (structured edits refine this per field).
//! - Cloning a change is a deep copy. History relies on this: the copy filed
//!   into a group is never touched by later merges into the staged copy.

use std::fmt;

use crate::changes::{
    AltRepeatKeyChange, BoardSettingsChange, ComboChange, CustomValueChange, EncoderChange,
    FragmentSelectionChange, KeyOverrideChange, KeymapChange, LayerColorChange, LeaderChange,
    MacroChange, OneShotChange, QmkBitChange, QmkSettingChange, TapDanceChange,
};
use crate::error::ChangeError;
use crate::key::ChangeKey;
use crate::keyboard::{Keyboard, KeyboardView};
use crate::value::SlotValue;

/// Capability set shared by every concrete edit.
pub trait SlotEdit: Clone + fmt::Debug {
    /// Snapshot type of the slot.
    type Value: Clone
        + PartialEq
        + fmt::Debug
        + Into<SlotValue>
        + TryFrom<SlotValue, Error = SlotValue>;

    /// Identity of the edited slot.
    fn key(&self) -> ChangeKey;

    fn old_value(&self) -> &Self::Value;

    fn new_value(&self) -> &Self::Value;

    /// Mutable `(old, new)` pair.
    fn values_mut(&mut self) -> (&mut Self::Value, &mut Self::Value);

    /// Push `value` into this slot on the device.
    fn write(&self, keyboard: &mut Keyboard, value: &Self::Value) -> bool;

    /// Store `value` into this slot of the local view, without device I/O.
    fn store_local(&self, view: &mut KeyboardView, value: &Self::Value);

    /// Push the new value to the device.
    fn apply(&self, keyboard: &mut Keyboard) -> bool {
        self.write(keyboard, self.new_value())
    }

    /// Push the old value to the device.
    fn revert(&self, keyboard: &mut Keyboard) -> bool {
        self.write(keyboard, self.old_value())
    }

    /// Restore the old (`use_old`) or new value into the local view.
    fn restore_local(&self, view: &mut KeyboardView, use_old: bool) {
        let value = if use_old {
            self.old_value()
        } else {
            self.new_value()
        };
        self.store_local(view, value);
    }

    /// Fold a newer edit of the same slot into this one.
    ///
    /// The default keeps `old` and takes the newer `new`.
    fn merge(&mut self, newer: &Self) -> bool {
        *self.values_mut().1 = newer.new_value().clone();
        true
    }
}

/// Any tracked edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Keymap(KeymapChange),
    Encoder(EncoderChange),
    Combo(ComboChange),
    TapDance(TapDanceChange),
    KeyOverride(KeyOverrideChange),
    AltRepeatKey(AltRepeatKeyChange),
    Leader(LeaderChange),
    Macro(MacroChange),
    QmkSetting(QmkSettingChange),
    QmkBit(QmkBitChange),
    CustomValue(CustomValueChange),
    BoardSettings(BoardSettingsChange),
    LayerColor(LayerColorChange),
    OneShot(OneShotChange),
    FragmentSelection(FragmentSelectionChange),
}

macro_rules! dispatch {
    ($value:expr, $edit:ident => $body:expr) => {
        match $value {
            Change::Keymap($edit) => $body,
            Change::Encoder($edit) => $body,
            Change::Combo($edit) => $body,
            Change::TapDance($edit) => $body,
            Change::KeyOverride($edit) => $body,
            Change::AltRepeatKey($edit) => $body,
            Change::Leader($edit) => $body,
            Change::Macro($edit) => $body,
            Change::QmkSetting($edit) => $body,
            Change::QmkBit($edit) => $body,
            Change::CustomValue($edit) => $body,
            Change::BoardSettings($edit) => $body,
            Change::LayerColor($edit) => $body,
            Change::OneShot($edit) => $body,
            Change::FragmentSelection($edit) => $body,
        }
    };
}

macro_rules! change_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Change {
                fn from(edit: $ty) -> Self {
                    Self::$variant(edit)
                }
            }
        )*
    };
}

change_from! {
    Keymap => KeymapChange,
    Encoder => EncoderChange,
    Combo => ComboChange,
    TapDance => TapDanceChange,
    KeyOverride => KeyOverrideChange,
    AltRepeatKey => AltRepeatKeyChange,
    Leader => LeaderChange,
    Macro => MacroChange,
    QmkSetting => QmkSettingChange,
    QmkBit => QmkBitChange,
    CustomValue => CustomValueChange,
    BoardSettings => BoardSettingsChange,
    LayerColor => LayerColorChange,
    OneShot => OneShotChange,
    FragmentSelection => FragmentSelectionChange,
}

impl Change {
    #[must_use]
    pub fn key(&self) -> ChangeKey {
        dispatch!(self, edit => edit.key())
    }

    /// Push the new value to the device. Returns whether it was accepted.
    pub fn apply(&self, keyboard: &mut Keyboard) -> bool {
        dispatch!(self, edit => edit.apply(keyboard))
    }

    /// Push the old value to the device. Returns whether it was accepted.
    pub fn revert(&self, keyboard: &mut Keyboard) -> bool {
        dispatch!(self, edit => edit.revert(keyboard))
    }

    /// Update only the in-memory view.
    pub fn restore_local(&self, view: &mut KeyboardView, use_old: bool) {
        dispatch!(self, edit => edit.restore_local(view, use_old));
    }

    /// Fold `newer` into `self`.
    ///
    /// Both changes must address the same slot; anything else is a caller
    /// defect and is reported as [`ChangeError::IncompatibleMerge`] with
    /// `self` untouched.
    pub fn merge(&mut self, newer: &Change) -> Result<(), ChangeError> {
        let existing = self.key();
        let incoming = newer.key();
        if existing != incoming {
            return Err(ChangeError::IncompatibleMerge { existing, incoming });
        }
        let merged = match (&mut *self, newer) {
            (Self::Keymap(a), Self::Keymap(b)) => a.merge(b),
            (Self::Encoder(a), Self::Encoder(b)) => a.merge(b),
            (Self::Combo(a), Self::Combo(b)) => a.merge(b),
            (Self::TapDance(a), Self::TapDance(b)) => a.merge(b),
            (Self::KeyOverride(a), Self::KeyOverride(b)) => a.merge(b),
            (Self::AltRepeatKey(a), Self::AltRepeatKey(b)) => a.merge(b),
            (Self::Leader(a), Self::Leader(b)) => a.merge(b),
            (Self::Macro(a), Self::Macro(b)) => a.merge(b),
            (Self::QmkSetting(a), Self::QmkSetting(b)) => a.merge(b),
            (Self::QmkBit(a), Self::QmkBit(b)) => a.merge(b),
            (Self::CustomValue(a), Self::CustomValue(b)) => a.merge(b),
            (Self::BoardSettings(a), Self::BoardSettings(b)) => a.merge(b),
            (Self::LayerColor(a), Self::LayerColor(b)) => a.merge(b),
            (Self::OneShot(a), Self::OneShot(b)) => a.merge(b),
            (Self::FragmentSelection(a), Self::FragmentSelection(b)) => a.merge(b),
            _ => false,
        };
        if merged {
            Ok(())
        } else {
            Err(ChangeError::IncompatibleMerge { existing, incoming })
        }
    }

    /// Old snapshot, type-erased.
    #[must_use]
    pub fn old_slot(&self) -> SlotValue {
        dispatch!(self, edit => edit.old_value().clone().into())
    }

    /// New snapshot, type-erased.
    #[must_use]
    pub fn new_slot(&self) -> SlotValue {
        dispatch!(self, edit => edit.new_value().clone().into())
    }

    /// A copy of this change with both snapshots replaced.
    pub fn rebased(&self, old: SlotValue, new: SlotValue) -> Result<Change, ChangeError> {
        dispatch!(self, edit => rebase(edit, old, new).map(Change::from))
    }

    /// Category name of the edited slot.
    #[must_use]
    pub fn category(&self) -> &'static str {
        self.key().category()
    }
}

fn rebase<E: SlotEdit>(edit: &E, old: SlotValue, new: SlotValue) -> Result<E, ChangeError> {
    let mismatch = |found: &SlotValue| ChangeError::ValueMismatch {
        key: edit.key(),
        expected: Into::<SlotValue>::into(edit.old_value().clone()).kind(),
        found: found.kind(),
    };
    let old = E::Value::try_from(old).map_err(|v| mismatch(&v))?;
    let new = E::Value::try_from(new).map_err(|v| mismatch(&v))?;
    let mut rebased = edit.clone();
    let (old_slot, new_slot) = rebased.values_mut();
    *old_slot = old;
    *new_slot = new;
    Ok(rebased)
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.key(), self.old_slot(), self.new_slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{Hsv, SettingsBlock};
    use crate::key::TargetId;
    use crate::memory_device::MemoryDevice;

    fn keyboard(device: &MemoryDevice) -> Keyboard {
        Keyboard::new(TargetId::new(1), KeyboardView::default(), device.clone())
    }

    #[test]
    fn default_merge_keeps_first_old_and_latest_new() {
        let mut a = Change::from(KeymapChange::new(0, 1, 2, 10, 11));
        let b = Change::from(KeymapChange::new(0, 1, 2, 11, 12));
        a.merge(&b).unwrap();
        assert_eq!(a.old_slot(), SlotValue::Keycode(10));
        assert_eq!(a.new_slot(), SlotValue::Keycode(12));
    }

    #[test]
    fn merge_rejects_other_slot() {
        let mut a = Change::from(KeymapChange::new(0, 1, 2, 10, 11));
        let before = a.clone();
        let b = Change::from(KeymapChange::new(0, 1, 3, 11, 12));
        let err = a.merge(&b).unwrap_err();
        assert!(matches!(err, ChangeError::IncompatibleMerge { .. }));
        assert_eq!(a, before);
    }

    #[test]
    fn merge_rejects_other_category() {
        let mut a = Change::from(QmkSettingChange::new(3, 1, 2));
        let b = Change::from(QmkBitChange::new(3, 0, false, true));
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn clone_is_independent_of_later_merges() {
        let staged = Change::from(QmkSettingChange::new(7, 0, 1));
        let frozen = staged.clone();
        let mut staged = staged;
        staged
            .merge(&Change::from(QmkSettingChange::new(7, 1, 5)))
            .unwrap();
        assert_eq!(frozen.new_slot(), SlotValue::Setting(1));
        assert_eq!(staged.new_slot(), SlotValue::Setting(5));
    }

    #[test]
    fn apply_and_revert_hit_the_device() {
        let device = MemoryDevice::new();
        let mut kb = keyboard(&device);
        let change = Change::from(KeymapChange::new(1, 0, 0, 4, 5));
        assert!(change.apply(&mut kb));
        assert_eq!(device.keycode_at(1, 0, 0), Some(5));
        assert!(change.revert(&mut kb));
        assert_eq!(device.keycode_at(1, 0, 0), Some(4));
    }

    #[test]
    fn restore_local_does_not_touch_device() {
        let device = MemoryDevice::new();
        let mut kb = keyboard(&device);
        let change = Change::from(KeymapChange::new(1, 0, 0, 4, 5));
        change.restore_local(&mut kb.view, false);
        assert_eq!(kb.view.keymap.get(&(1, 0, 0)), Some(&5));
        change.restore_local(&mut kb.view, true);
        assert_eq!(kb.view.keymap.get(&(1, 0, 0)), Some(&4));
        assert_eq!(device.write_count(), 0);
    }

    #[test]
    fn rebased_replaces_both_values() {
        let change = Change::from(LayerColorChange::new(2, Hsv::new(0, 0, 0), Hsv::new(1, 1, 1)));
        let rebased = change
            .rebased(
                SlotValue::Color(Hsv::new(9, 9, 9)),
                SlotValue::Color(Hsv::new(3, 3, 3)),
            )
            .unwrap();
        assert_eq!(rebased.key(), change.key());
        assert_eq!(rebased.old_slot(), SlotValue::Color(Hsv::new(9, 9, 9)));
        assert_eq!(rebased.new_slot(), SlotValue::Color(Hsv::new(3, 3, 3)));
    }

    #[test]
    fn rebased_rejects_wrong_kind() {
        let change = Change::from(BoardSettingsChange::new(
            SettingsBlock::new().with("auto_mouse", 0),
            SettingsBlock::new().with("auto_mouse", 1),
        ));
        let err = change
            .rebased(SlotValue::Bit(false), SlotValue::Bit(true))
            .unwrap_err();
        assert_eq!(
            err,
            ChangeError::ValueMismatch {
                key: ChangeKey::BoardSettings,
                expected: "settings",
                found: "bit",
            }
        );
    }

    #[test]
    fn display_shows_key_and_values() {
        let change = Change::from(KeymapChange::new(0, 1, 2, 4, 5));
        assert_eq!(change.to_string(), "keymap[0,1,2]: 0x0004 -> 0x0005");
    }
}
