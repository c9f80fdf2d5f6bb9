#![forbid(unsafe_code)]

//! Snapshot payloads for structured slots.
//!
//! These are plain values: an editor copies the displayed state into one of
//! these structs when it builds a change, so later edits to the display never
//! alias a recorded snapshot. Keycodes are carried in their numeric wire form;
//! symbolic keycode encoding lives outside this crate.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bit set in a term/options word when the entry is enabled.
pub const ENTRY_ENABLED_BIT: u16 = 1 << 15;

/// A combo: up to four trigger keys producing one output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComboEntry {
    pub keys: [u16; 4],
    pub output: u16,
    /// Custom combo term in ms; bit 15 marks the entry enabled.
    pub term: u16,
}

impl ComboEntry {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.term & ENTRY_ENABLED_BIT != 0
    }
}

/// A tap-dance rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TapDanceEntry {
    pub on_tap: u16,
    pub on_hold: u16,
    pub on_double_tap: u16,
    pub on_tap_hold: u16,
    /// Custom tapping term in ms; bit 15 marks the entry enabled.
    pub tapping_term: u16,
}

/// A key override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyOverrideEntry {
    pub trigger: u16,
    pub replacement: u16,
    /// 32-bit layer mask.
    pub layers: u32,
    pub trigger_mods: u8,
    pub negative_mod_mask: u8,
    pub suppressed_mods: u8,
    /// Option flags; bit 7 marks the override enabled.
    pub options: u8,
}

impl KeyOverrideEntry {
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.options & 0x80 != 0
    }
}

/// An alternate-repeat-key rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AltRepeatEntry {
    pub keycode: u16,
    pub alt_keycode: u16,
    pub allowed_mods: u8,
    pub options: u8,
}

/// A leader sequence: up to five keys producing one output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LeaderEntry {
    pub sequence: [u16; 5],
    pub output: u16,
    /// Bit 15 marks the entry enabled.
    pub options: u16,
}

/// A layer indicator color in firmware HSV (each channel 0..=255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    #[must_use]
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

/// One-shot key settings, written to the device together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OneShotSettings {
    pub timeout: u16,
    pub tap_toggle: u8,
}

/// A named block of board settings (DPI indices, scroll flags, timers...).
///
/// A change may carry only the fields it touches; [`SettingsBlock::overlay`]
/// folds such a partial block onto a complete one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SettingsBlock(pub BTreeMap<String, i32>);

impl SettingsBlock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: i32) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<i32> {
        self.0.get(field).copied()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: i32) {
        self.0.insert(field.into(), value);
    }

    /// Copy every field of `partial` over `self`.
    pub fn overlay(&mut self, partial: &Self) {
        for (field, value) in &partial.0 {
            self.0.insert(field.clone(), *value);
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<i32> {
        self.0.remove(field)
    }

    /// The fields of `self` that also appear in `template`.
    #[must_use]
    pub fn restricted_to(&self, template: &Self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(field, _)| template.0.contains_key(*field))
                .map(|(field, value)| (field.clone(), *value))
                .collect(),
        )
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, i32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Option index stored on the device when no fragment is selected.
pub const NO_FRAGMENT: u8 = 0xFF;

/// The chosen option of a selectable layout module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FragmentChoice {
    /// Fragment name shown in the UI, if any is selected.
    pub fragment: Option<String>,
    /// Option index as stored in EEPROM.
    pub option_index: u8,
}

impl FragmentChoice {
    #[must_use]
    pub fn selected(fragment: impl Into<String>, option_index: u8) -> Self {
        Self {
            fragment: Some(fragment.into()),
            option_index,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            fragment: None,
            option_index: NO_FRAGMENT,
        }
    }
}

impl Default for FragmentChoice {
    fn default() -> Self {
        Self::none()
    }
}
