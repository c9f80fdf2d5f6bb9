#![forbid(unsafe_code)]

//! Type-erased slot values.
//!
//! The manager compares values across different changes to the same slot and
//! remembers the last committed value of every slot. Those comparisons need a
//! single value type, so every payload converts losslessly into and out of
//! [`SlotValue`].

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entries::{
    AltRepeatEntry, ComboEntry, FragmentChoice, Hsv, KeyOverrideEntry, LeaderEntry,
    OneShotSettings, SettingsBlock, TapDanceEntry,
};

/// A snapshot of one slot's value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "snake_case"))]
pub enum SlotValue {
    Keycode(u16),
    Combo(ComboEntry),
    TapDance(TapDanceEntry),
    KeyOverride(KeyOverrideEntry),
    AltRepeat(AltRepeatEntry),
    Leader(LeaderEntry),
    Bytes(Vec<u8>),
    Setting(u32),
    Bit(bool),
    Settings(SettingsBlock),
    Color(Hsv),
    OneShot(OneShotSettings),
    Fragment(FragmentChoice),
}

impl SlotValue {
    /// Name of the value kind, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Keycode(_) => "keycode",
            Self::Combo(_) => "combo",
            Self::TapDance(_) => "tap_dance",
            Self::KeyOverride(_) => "key_override",
            Self::AltRepeat(_) => "alt_repeat",
            Self::Leader(_) => "leader",
            Self::Bytes(_) => "bytes",
            Self::Setting(_) => "setting",
            Self::Bit(_) => "bit",
            Self::Settings(_) => "settings",
            Self::Color(_) => "color",
            Self::OneShot(_) => "oneshot",
            Self::Fragment(_) => "fragment",
        }
    }
}

impl SlotValue {
    /// Fold a newer value of the same slot over this one.
    ///
    /// Settings blocks merge per field; every other kind is replaced.
    pub fn absorb(&mut self, newer: SlotValue) {
        match (self, newer) {
            (Self::Settings(current), Self::Settings(newer)) => current.overlay(&newer),
            (current, newer) => *current = newer,
        }
    }

    /// This value limited to the fields present in `template`.
    ///
    /// Only settings blocks have fields; any other value is returned whole.
    #[must_use]
    pub fn restricted_to(&self, template: &SlotValue) -> SlotValue {
        match (self, template) {
            (Self::Settings(block), Self::Settings(fields)) => {
                Self::Settings(block.restricted_to(fields))
            }
            _ => self.clone(),
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keycode(code) => write!(f, "{code:#06x}"),
            Self::Bytes(bytes) => write!(f, "{} bytes", bytes.len()),
            Self::Setting(value) => write!(f, "{value}"),
            Self::Bit(bit) => write!(f, "{}", u8::from(*bit)),
            Self::Color(hsv) => write!(f, "hsv({}, {}, {})", hsv.h, hsv.s, hsv.v),
            Self::Fragment(choice) => match &choice.fragment {
                Some(name) => write!(f, "{name} (#{})", choice.option_index),
                None => f.write_str("none"),
            },
            other => write!(f, "{other:?}"),
        }
    }
}

macro_rules! slot_value_conversions {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for SlotValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }

            impl TryFrom<SlotValue> for $ty {
                type Error = SlotValue;

                fn try_from(value: SlotValue) -> Result<Self, Self::Error> {
                    match value {
                        SlotValue::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

slot_value_conversions! {
    Keycode => u16,
    Combo => ComboEntry,
    TapDance => TapDanceEntry,
    KeyOverride => KeyOverrideEntry,
    AltRepeat => AltRepeatEntry,
    Leader => LeaderEntry,
    Bytes => Vec<u8>,
    Setting => u32,
    Bit => bool,
    Settings => SettingsBlock,
    Color => Hsv,
    OneShot => OneShotSettings,
    Fragment => FragmentChoice,
}
