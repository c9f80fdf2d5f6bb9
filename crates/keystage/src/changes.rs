#![forbid(unsafe_code)]

//! Concrete edits, one per slot category.

use crate::change::SlotEdit;
use crate::entries::{
    AltRepeatEntry, ComboEntry, FragmentChoice, Hsv, KeyOverrideEntry, LeaderEntry,
    OneShotSettings, SettingsBlock, TapDanceEntry,
};
use crate::key::ChangeKey;
use crate::keyboard::{Keyboard, KeyboardView};

/// Accessors for edits storing their snapshots in `old` / `new` fields.
macro_rules! snapshot_accessors {
    ($ty:ty) => {
        type Value = $ty;

        fn old_value(&self) -> &Self::Value {
            &self.old
        }

        fn new_value(&self) -> &Self::Value {
            &self.new
        }

        fn values_mut(&mut self) -> (&mut Self::Value, &mut Self::Value) {
            (&mut self.old, &mut self.new)
        }
    };
}

/// Edit of one keymap cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapChange {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
    pub old: u16,
    pub new: u16,
}

impl KeymapChange {
    #[must_use]
    pub const fn new(layer: u8, row: u8, col: u8, old: u16, new: u16) -> Self {
        Self {
            layer,
            row,
            col,
            old,
            new,
        }
    }
}

impl SlotEdit for KeymapChange {
    snapshot_accessors!(u16);

    fn key(&self) -> ChangeKey {
        ChangeKey::Keymap {
            layer: self.layer,
            row: self.row,
            col: self.col,
        }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &u16) -> bool {
        keyboard
            .device_mut()
            .commit_key(self.layer, self.row, self.col, *value)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &u16) {
        view.keymap.insert((self.layer, self.row, self.col), *value);
    }
}

/// Edit of one encoder direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderChange {
    pub layer: u8,
    pub index: u8,
    /// 0 = clockwise, 1 = counter-clockwise.
    pub direction: u8,
    pub old: u16,
    pub new: u16,
}

impl EncoderChange {
    #[must_use]
    pub const fn new(layer: u8, index: u8, direction: u8, old: u16, new: u16) -> Self {
        Self {
            layer,
            index,
            direction,
            old,
            new,
        }
    }
}

impl SlotEdit for EncoderChange {
    snapshot_accessors!(u16);

    fn key(&self) -> ChangeKey {
        ChangeKey::Encoder {
            layer: self.layer,
            index: self.index,
            direction: self.direction,
        }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &u16) -> bool {
        keyboard
            .device_mut()
            .commit_encoder(self.layer, self.index, self.direction, *value)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &u16) {
        view.encoders
            .insert((self.layer, self.index, self.direction), *value);
    }
}

/// Stores `value` at `index` when the view already has that many entries.
///
/// The view's entry tables are sized by the firmware; an index past the end
/// means the view has not been loaded and there is nothing to refresh.
fn store_entry<T: Clone>(entries: &mut [T], index: u16, value: &T) {
    if let Some(slot) = entries.get_mut(usize::from(index)) {
        *slot = value.clone();
    }
}

/// Declares an edit of one entry in an indexed table (combos, tap dances...).
macro_rules! indexed_entry_change {
    (
        $(#[$meta:meta])*
        $name:ident, $entry:ty, $key:ident, $table:ident, $commit:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub index: u16,
            pub old: $entry,
            pub new: $entry,
        }

        impl $name {
            #[must_use]
            pub const fn new(index: u16, old: $entry, new: $entry) -> Self {
                Self { index, old, new }
            }
        }

        impl SlotEdit for $name {
            snapshot_accessors!($entry);

            fn key(&self) -> ChangeKey {
                ChangeKey::$key { index: self.index }
            }

            fn write(&self, keyboard: &mut Keyboard, value: &$entry) -> bool {
                keyboard.device_mut().$commit(self.index, value)
            }

            fn store_local(&self, view: &mut KeyboardView, value: &$entry) {
                store_entry(&mut view.$table, self.index, value);
            }
        }
    };
}

indexed_entry_change!(
    /// Edit of one combo entry.
    ComboChange, ComboEntry, Combo, combos, commit_combo
);
indexed_entry_change!(
    /// Edit of one tap-dance entry.
    TapDanceChange, TapDanceEntry, TapDance, tap_dances, commit_tap_dance
);
indexed_entry_change!(
    /// Edit of one key-override entry.
    KeyOverrideChange, KeyOverrideEntry, KeyOverride, key_overrides, commit_key_override
);
indexed_entry_change!(
    /// Edit of one alternate-repeat-key entry.
    AltRepeatKeyChange, AltRepeatEntry, AltRepeatKey, alt_repeat_keys, commit_alt_repeat_key
);
indexed_entry_change!(
    /// Edit of one leader-sequence entry.
    LeaderChange, LeaderEntry, Leader, leaders, commit_leader
);

/// Edit of one macro.
///
/// Macros share one buffer on the device, so a write serializes every macro
/// in the view with this one substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroChange {
    pub index: u16,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

impl MacroChange {
    #[must_use]
    pub fn new(index: u16, old: impl Into<Vec<u8>>, new: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            old: old.into(),
            new: new.into(),
        }
    }
}

impl SlotEdit for MacroChange {
    snapshot_accessors!(Vec<u8>);

    fn key(&self) -> ChangeKey {
        ChangeKey::Macro { index: self.index }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &Vec<u8>) -> bool {
        let buffer = keyboard
            .view
            .macro_buffer_with(usize::from(self.index), value);
        keyboard.device_mut().commit_macro(&buffer)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &Vec<u8>) {
        view.set_macro(usize::from(self.index), value);
    }
}

/// Edit of a whole numeric QMK setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QmkSettingChange {
    pub qsid: u16,
    pub old: u32,
    pub new: u32,
}

impl QmkSettingChange {
    #[must_use]
    pub const fn new(qsid: u16, old: u32, new: u32) -> Self {
        Self { qsid, old, new }
    }
}

impl SlotEdit for QmkSettingChange {
    snapshot_accessors!(u32);

    fn key(&self) -> ChangeKey {
        ChangeKey::QmkSetting { qsid: self.qsid }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &u32) -> bool {
        keyboard.device_mut().commit_qmk_setting(self.qsid, *value)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &u32) {
        view.settings.insert(self.qsid, *value);
    }
}

/// Edit of one bit inside a bitfield QMK setting.
///
/// The device only accepts whole words: a write recomposes the word from the
/// view, stores it back into the view and commits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QmkBitChange {
    pub qsid: u16,
    pub bit: u8,
    pub old: bool,
    pub new: bool,
}

impl QmkBitChange {
    #[must_use]
    pub const fn new(qsid: u16, bit: u8, old: bool, new: bool) -> Self {
        Self {
            qsid,
            bit,
            old,
            new,
        }
    }
}

impl SlotEdit for QmkBitChange {
    snapshot_accessors!(bool);

    fn key(&self) -> ChangeKey {
        ChangeKey::QmkSettingBit {
            qsid: self.qsid,
            bit: self.bit,
        }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &bool) -> bool {
        let (view, device) = keyboard.parts_mut();
        let word = view.setting_with_bit(self.qsid, self.bit, *value);
        view.settings.insert(self.qsid, word);
        device.commit_qmk_setting(self.qsid, word)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &bool) {
        let word = view.setting_with_bit(self.qsid, self.bit, *value);
        view.settings.insert(self.qsid, word);
    }
}

/// Edit of a keyboard-specific custom value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomValueChange {
    pub channel: u8,
    pub value_id: u8,
    pub old: Vec<u8>,
    pub new: Vec<u8>,
}

impl CustomValueChange {
    #[must_use]
    pub fn new(channel: u8, value_id: u8, old: impl Into<Vec<u8>>, new: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            value_id,
            old: old.into(),
            new: new.into(),
        }
    }
}

impl SlotEdit for CustomValueChange {
    snapshot_accessors!(Vec<u8>);

    fn key(&self) -> ChangeKey {
        ChangeKey::CustomValue {
            channel: self.channel,
            value_id: self.value_id,
        }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &Vec<u8>) -> bool {
        keyboard
            .device_mut()
            .commit_custom_value(self.channel, self.value_id, value)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &Vec<u8>) {
        view.custom_values
            .insert((self.channel, self.value_id), value.clone());
    }
}

/// Edit of some fields of the board settings block.
///
/// `old` and `new` hold only the touched fields. Writes overlay them on the
/// full block from the view, since the device takes the block as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSettingsChange {
    pub old: SettingsBlock,
    pub new: SettingsBlock,
}

impl BoardSettingsChange {
    #[must_use]
    pub const fn new(old: SettingsBlock, new: SettingsBlock) -> Self {
        Self { old, new }
    }

    /// Edit of a single field.
    #[must_use]
    pub fn field(name: &str, old: i32, new: i32) -> Self {
        Self::new(
            SettingsBlock::new().with(name, old),
            SettingsBlock::new().with(name, new),
        )
    }
}

impl SlotEdit for BoardSettingsChange {
    snapshot_accessors!(SettingsBlock);

    fn key(&self) -> ChangeKey {
        ChangeKey::BoardSettings
    }

    fn write(&self, keyboard: &mut Keyboard, value: &SettingsBlock) -> bool {
        let mut full = keyboard.view.board_settings.clone();
        full.overlay(value);
        keyboard.device_mut().commit_board_settings(&full)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &SettingsBlock) {
        view.board_settings.overlay(value);
    }

    /// Merges per field: newer values overwrite `new`, and `old` keeps the
    /// first value seen for each field.
    fn merge(&mut self, newer: &Self) -> bool {
        self.new.overlay(&newer.new);
        for (field, value) in newer.old.fields() {
            if self.old.get(field).is_none() {
                self.old.insert(field, value);
            }
        }
        true
    }
}

/// Edit of one layer's indicator color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerColorChange {
    pub layer: u8,
    pub old: Hsv,
    pub new: Hsv,
}

impl LayerColorChange {
    #[must_use]
    pub const fn new(layer: u8, old: Hsv, new: Hsv) -> Self {
        Self { layer, old, new }
    }
}

impl SlotEdit for LayerColorChange {
    snapshot_accessors!(Hsv);

    fn key(&self) -> ChangeKey {
        ChangeKey::LayerColor { layer: self.layer }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &Hsv) -> bool {
        keyboard.device_mut().commit_layer_color(self.layer, *value)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &Hsv) {
        if let Some(slot) = view.layer_colors.get_mut(usize::from(self.layer)) {
            *slot = *value;
        }
    }

    fn merge(&mut self, newer: &Self) -> bool {
        if newer.layer != self.layer {
            return false;
        }
        self.new = newer.new;
        true
    }
}

/// Edit of the one-shot settings pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotChange {
    pub old: OneShotSettings,
    pub new: OneShotSettings,
}

impl OneShotChange {
    #[must_use]
    pub const fn new(old: OneShotSettings, new: OneShotSettings) -> Self {
        Self { old, new }
    }
}

impl SlotEdit for OneShotChange {
    snapshot_accessors!(OneShotSettings);

    fn key(&self) -> ChangeKey {
        ChangeKey::OneShot
    }

    fn write(&self, keyboard: &mut Keyboard, value: &OneShotSettings) -> bool {
        keyboard.device_mut().commit_oneshot(*value)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &OneShotSettings) {
        view.oneshot = *value;
    }
}

/// Edit of the selected option of a layout module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSelectionChange {
    pub instance_id: String,
    /// Position of the instance in the device's selection table.
    pub instance_idx: u8,
    pub old: FragmentChoice,
    pub new: FragmentChoice,
}

impl FragmentSelectionChange {
    #[must_use]
    pub fn new(
        instance_id: impl Into<String>,
        instance_idx: u8,
        old: FragmentChoice,
        new: FragmentChoice,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            instance_idx,
            old,
            new,
        }
    }
}

impl SlotEdit for FragmentSelectionChange {
    snapshot_accessors!(FragmentChoice);

    fn key(&self) -> ChangeKey {
        ChangeKey::FragmentSelection {
            instance_id: self.instance_id.clone(),
        }
    }

    fn write(&self, keyboard: &mut Keyboard, value: &FragmentChoice) -> bool {
        keyboard
            .device_mut()
            .commit_fragment_selection(self.instance_idx, value.option_index)
    }

    fn store_local(&self, view: &mut KeyboardView, value: &FragmentChoice) {
        match &value.fragment {
            Some(name) => {
                view.fragment_selections
                    .insert(self.instance_id.clone(), name.clone());
            }
            None => {
                view.fragment_selections.remove(&self.instance_id);
            }
        }
    }
}
