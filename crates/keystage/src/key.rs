#![forbid(unsafe_code)]

//! Slot and target identities.
//!
//! Every editable slot on a keyboard is addressed by a [`ChangeKey`]: a
//! category tag followed by the minimum indices needed to disambiguate the
//! slot within that category. Two changes with equal keys edit the same slot
//! and are merged rather than stored side by side.
//!
//! Keys are totally ordered so that staged diffs iterate (and are pushed to
//! the device) in a deterministic order.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of one physical keyboard.
///
/// Per-target bookkeeping is looked up by this ID, so reconnecting the same
/// keyboard restores its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetId(pub u64);

impl TargetId {
    /// Create a new target ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Composite identity of one editable slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "category", rename_all = "snake_case"))]
pub enum ChangeKey {
    /// A keymap cell.
    Keymap { layer: u8, row: u8, col: u8 },
    /// One rotation direction of an encoder (0 = CW, 1 = CCW).
    Encoder { layer: u8, index: u8, direction: u8 },
    /// A combo entry.
    Combo { index: u16 },
    /// A tap-dance entry.
    TapDance { index: u16 },
    /// A key-override entry.
    KeyOverride { index: u16 },
    /// An alternate-repeat-key entry.
    AltRepeatKey { index: u16 },
    /// A leader-sequence entry.
    Leader { index: u16 },
    /// A single macro within the shared macro buffer.
    Macro { index: u16 },
    /// A whole numeric QMK setting.
    QmkSetting { qsid: u16 },
    /// One bit of a bitfield QMK setting.
    QmkSettingBit { qsid: u16, bit: u8 },
    /// A keyboard-specific custom value.
    CustomValue { channel: u8, value_id: u8 },
    /// The board-level settings block.
    BoardSettings,
    /// The indicator color of one layer.
    LayerColor { layer: u8 },
    /// One-shot key settings.
    OneShot,
    /// The selected option of a selectable layout module.
    FragmentSelection { instance_id: String },
}

impl ChangeKey {
    /// Category tag shared by every key of the same kind.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Keymap { .. } => "keymap",
            Self::Encoder { .. } => "encoder",
            Self::Combo { .. } => "combo",
            Self::TapDance { .. } => "tap_dance",
            Self::KeyOverride { .. } => "key_override",
            Self::AltRepeatKey { .. } => "alt_repeat_key",
            Self::Leader { .. } => "leader",
            Self::Macro { .. } => "macro",
            Self::QmkSetting { .. } => "qmk_setting",
            Self::QmkSettingBit { .. } => "qmk_setting_bit",
            Self::CustomValue { .. } => "custom_value",
            Self::BoardSettings => "board_settings",
            Self::LayerColor { .. } => "layer_color",
            Self::OneShot => "oneshot",
            Self::FragmentSelection { .. } => "fragment_selection",
        }
    }

    /// Convenience constructor for a keymap cell.
    #[must_use]
    pub const fn keymap(layer: u8, row: u8, col: u8) -> Self {
        Self::Keymap { layer, row, col }
    }
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let category = self.category();
        match self {
            Self::Keymap { layer, row, col } => write!(f, "{category}[{layer},{row},{col}]"),
            Self::Encoder {
                layer,
                index,
                direction,
            } => write!(f, "{category}[{layer},{index},{direction}]"),
            Self::Combo { index }
            | Self::TapDance { index }
            | Self::KeyOverride { index }
            | Self::AltRepeatKey { index }
            | Self::Leader { index }
            | Self::Macro { index } => write!(f, "{category}[{index}]"),
            Self::QmkSetting { qsid } => write!(f, "{category}[{qsid}]"),
            Self::QmkSettingBit { qsid, bit } => write!(f, "{category}[{qsid},{bit}]"),
            Self::CustomValue { channel, value_id } => {
                write!(f, "{category}[{channel},{value_id}]")
            }
            Self::LayerColor { layer } => write!(f, "{category}[{layer}]"),
            Self::FragmentSelection { instance_id } => write!(f, "{category}[{instance_id}]"),
            Self::BoardSettings | Self::OneShot => f.write_str(category),
        }
    }
}
