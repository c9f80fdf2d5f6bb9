#![forbid(unsafe_code)]

//! The keyboard handle: local display state plus the device boundary.
//!
//! [`KeyboardView`] is the in-memory copy of everything the editors display.
//! Undo and redo rewrite it without touching the device.
//!
//! [`Device`] is the narrow boundary to the physical keyboard. Each method
//! performs exactly one logical write and reports whether it was accepted.
//! Framing, retries and timeouts belong to the implementor; the change engine
//! treats every call as a single blocking, all-or-nothing operation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::entries::{
    AltRepeatEntry, ComboEntry, Hsv, KeyOverrideEntry, LeaderEntry, OneShotSettings,
    SettingsBlock, TapDanceEntry,
};
use crate::key::TargetId;

/// Write boundary to one physical keyboard.
///
/// Implementations must not retry a rejected write themselves, and must not
/// partially apply one call.
pub trait Device {
    fn commit_key(&mut self, layer: u8, row: u8, col: u8, keycode: u16) -> bool;

    fn commit_encoder(&mut self, layer: u8, index: u8, direction: u8, keycode: u16) -> bool;

    fn commit_combo(&mut self, index: u16, entry: &ComboEntry) -> bool;

    fn commit_tap_dance(&mut self, index: u16, entry: &TapDanceEntry) -> bool;

    fn commit_key_override(&mut self, index: u16, entry: &KeyOverrideEntry) -> bool;

    fn commit_alt_repeat_key(&mut self, index: u16, entry: &AltRepeatEntry) -> bool;

    fn commit_leader(&mut self, index: u16, entry: &LeaderEntry) -> bool;

    /// Write the whole NUL-separated macro buffer.
    fn commit_macro(&mut self, buffer: &[u8]) -> bool;

    fn commit_qmk_setting(&mut self, qsid: u16, value: u32) -> bool;

    fn commit_custom_value(&mut self, channel: u8, value_id: u8, data: &[u8]) -> bool;

    /// Write the complete board settings block.
    fn commit_board_settings(&mut self, settings: &SettingsBlock) -> bool;

    fn commit_layer_color(&mut self, layer: u8, color: Hsv) -> bool;

    fn commit_oneshot(&mut self, settings: OneShotSettings) -> bool;

    fn commit_fragment_selection(&mut self, instance_idx: u8, option_index: u8) -> bool;
}

/// In-memory display state of one keyboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyboardView {
    /// Keymap cells by `(layer, row, col)`.
    pub keymap: HashMap<(u8, u8, u8), u16>,
    /// Encoder actions by `(layer, index, direction)`.
    pub encoders: HashMap<(u8, u8, u8), u16>,
    pub combos: Vec<ComboEntry>,
    pub tap_dances: Vec<TapDanceEntry>,
    pub key_overrides: Vec<KeyOverrideEntry>,
    pub alt_repeat_keys: Vec<AltRepeatEntry>,
    pub leaders: Vec<LeaderEntry>,
    /// Individual macros; serialized into one NUL-separated buffer on write.
    pub macros: Vec<Vec<u8>>,
    /// Number of macro slots the firmware exposes.
    pub macro_count: usize,
    /// QMK settings by qsid.
    pub settings: HashMap<u16, u32>,
    /// Custom values by `(channel, value_id)`.
    pub custom_values: HashMap<(u8, u8), Vec<u8>>,
    pub board_settings: SettingsBlock,
    pub layer_colors: Vec<Hsv>,
    pub oneshot: OneShotSettings,
    /// Selected fragment name per selectable module instance.
    pub fragment_selections: BTreeMap<String, String>,
}

impl KeyboardView {
    /// Build the full macro buffer with macro `index` replaced by `value`.
    ///
    /// Missing macros are padded with empty entries and the result holds
    /// exactly `macro_count` entries, each NUL-terminated.
    #[must_use]
    pub fn macro_buffer_with(&self, index: usize, value: &[u8]) -> Vec<u8> {
        let mut macros = self.padded_macros(index);
        macros[index] = value.to_vec();
        join_macros(&macros, self.macro_count)
    }

    /// Replace macro `index` in the local view.
    pub fn set_macro(&mut self, index: usize, value: &[u8]) {
        let mut macros = self.padded_macros(index);
        macros[index] = value.to_vec();
        macros.truncate(self.macro_count.max(index + 1));
        self.macros = macros;
    }

    /// Serialized macro buffer as currently displayed.
    #[must_use]
    pub fn macro_buffer(&self) -> Vec<u8> {
        join_macros(&self.macros, self.macro_count)
    }

    fn padded_macros(&self, index: usize) -> Vec<Vec<u8>> {
        let mut macros = self.macros.clone();
        if macros.len() <= index {
            macros.resize(index + 1, Vec::new());
        }
        macros
    }

    /// Current word of a QMK setting with one bit forced to `set`.
    #[must_use]
    pub fn setting_with_bit(&self, qsid: u16, bit: u8, set: bool) -> u32 {
        let current = self.settings.get(&qsid).copied().unwrap_or(0);
        let mask = 1_u32.checked_shl(u32::from(bit)).unwrap_or(0);
        if set { current | mask } else { current & !mask }
    }
}

fn join_macros(macros: &[Vec<u8>], count: usize) -> Vec<u8> {
    let mut buffer = Vec::new();
    for index in 0..count {
        if let Some(m) = macros.get(index) {
            buffer.extend_from_slice(m);
        }
        buffer.push(0);
    }
    buffer
}

/// A connected keyboard: identity, display state and device boundary.
pub struct Keyboard {
    id: TargetId,
    /// Display state. Editors mutate this directly when the user edits.
    pub view: KeyboardView,
    device: Box<dyn Device>,
}

impl fmt::Debug for Keyboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyboard")
            .field("id", &self.id)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl Keyboard {
    #[must_use]
    pub fn new(id: TargetId, view: KeyboardView, device: impl Device + 'static) -> Self {
        Self {
            id,
            view,
            device: Box::new(device),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TargetId {
        self.id
    }

    /// Mutable access to the device boundary.
    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Split borrow used by writes that read the view while talking to the
    /// device (macro buffers, bitfield settings).
    pub fn parts_mut(&mut self) -> (&mut KeyboardView, &mut dyn Device) {
        (&mut self.view, self.device.as_mut())
    }
}
