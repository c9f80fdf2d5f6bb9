#![forbid(unsafe_code)]

//! In-memory [`Device`] with a write log and fault injection.
//!
//! `MemoryDevice` stands in for real hardware in tests and in headless
//! embedders. Clones share the same log, so a test can hand one clone to a
//! [`Keyboard`](crate::keyboard::Keyboard) and keep another for assertions.
//!
//! # Fault injection
//!
//! - [`MemoryDevice::reject_all`]: every subsequent write is refused.
//! - [`MemoryDevice::reject_after`]: the next `n` writes succeed, the rest fail.
//! - [`MemoryDevice::reject_category`]: writes of one slot category fail.
//!
//! Rejected writes leave the stored state untouched and are counted
//! separately from accepted ones.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::trace;

use crate::entries::{
    AltRepeatEntry, ComboEntry, Hsv, KeyOverrideEntry, LeaderEntry, OneShotSettings,
    SettingsBlock, TapDanceEntry,
};
use crate::keyboard::Device;

/// One accepted device write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceWrite {
    Key { layer: u8, row: u8, col: u8, keycode: u16 },
    Encoder { layer: u8, index: u8, direction: u8, keycode: u16 },
    Combo { index: u16, entry: ComboEntry },
    TapDance { index: u16, entry: TapDanceEntry },
    KeyOverride { index: u16, entry: KeyOverrideEntry },
    AltRepeatKey { index: u16, entry: AltRepeatEntry },
    Leader { index: u16, entry: LeaderEntry },
    Macro { buffer: Vec<u8> },
    QmkSetting { qsid: u16, value: u32 },
    CustomValue { channel: u8, value_id: u8, data: Vec<u8> },
    BoardSettings { settings: SettingsBlock },
    LayerColor { layer: u8, color: Hsv },
    OneShot { settings: OneShotSettings },
    FragmentSelection { instance_idx: u8, option_index: u8 },
}

impl DeviceWrite {
    /// Slot category of the write, matching [`ChangeKey::category`](crate::key::ChangeKey::category)
    /// (bit writes report `qmk_setting` since they rewrite the whole word).
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Key { .. } => "keymap",
            Self::Encoder { .. } => "encoder",
            Self::Combo { .. } => "combo",
            Self::TapDance { .. } => "tap_dance",
            Self::KeyOverride { .. } => "key_override",
            Self::AltRepeatKey { .. } => "alt_repeat_key",
            Self::Leader { .. } => "leader",
            Self::Macro { .. } => "macro",
            Self::QmkSetting { .. } => "qmk_setting",
            Self::CustomValue { .. } => "custom_value",
            Self::BoardSettings { .. } => "board_settings",
            Self::LayerColor { .. } => "layer_color",
            Self::OneShot { .. } => "oneshot",
            Self::FragmentSelection { .. } => "fragment_selection",
        }
    }
}

#[derive(Debug, Default)]
struct DeviceLog {
    writes: Vec<DeviceWrite>,
    rejected: usize,
    reject_all: bool,
    accept_budget: Option<usize>,
    rejected_categories: BTreeSet<&'static str>,
}

/// Shared-handle in-memory device.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    log: Rc<RefCell<DeviceLog>>,
}

impl MemoryDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every write from now on (or accept again with `false`).
    pub fn reject_all(&self, reject: bool) {
        self.log.borrow_mut().reject_all = reject;
    }

    /// Accept the next `accepted` writes, then refuse the rest.
    pub fn reject_after(&self, accepted: usize) {
        self.log.borrow_mut().accept_budget = Some(accepted);
    }

    /// Refuse writes of one category (see [`DeviceWrite::category`]).
    pub fn reject_category(&self, category: &'static str) {
        self.log.borrow_mut().rejected_categories.insert(category);
    }

    /// Clear every fault injection rule.
    pub fn heal(&self) {
        let mut log = self.log.borrow_mut();
        log.reject_all = false;
        log.accept_budget = None;
        log.rejected_categories.clear();
    }

    /// All accepted writes, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<DeviceWrite> {
        self.log.borrow().writes.clone()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.log.borrow().writes.len()
    }

    #[must_use]
    pub fn rejected_count(&self) -> usize {
        self.log.borrow().rejected
    }

    #[must_use]
    pub fn last_write(&self) -> Option<DeviceWrite> {
        self.log.borrow().writes.last().cloned()
    }

    /// Keycode the device holds for a keymap cell, if it was ever written.
    #[must_use]
    pub fn keycode_at(&self, layer: u8, row: u8, col: u8) -> Option<u16> {
        self.find_last(|w| match *w {
            DeviceWrite::Key {
                layer: l,
                row: r,
                col: c,
                keycode,
            } if (l, r, c) == (layer, row, col) => Some(keycode),
            _ => None,
        })
    }

    /// Value the device holds for a QMK setting, if it was ever written.
    #[must_use]
    pub fn setting(&self, qsid: u16) -> Option<u32> {
        self.find_last(|w| match *w {
            DeviceWrite::QmkSetting { qsid: q, value } if q == qsid => Some(value),
            _ => None,
        })
    }

    /// Last macro buffer written.
    #[must_use]
    pub fn macro_buffer(&self) -> Option<Vec<u8>> {
        self.find_last(|w| match w {
            DeviceWrite::Macro { buffer } => Some(buffer.clone()),
            _ => None,
        })
    }

    fn find_last<T>(&self, f: impl Fn(&DeviceWrite) -> Option<T>) -> Option<T> {
        self.log.borrow().writes.iter().rev().find_map(f)
    }

    fn record(&mut self, write: DeviceWrite) -> bool {
        let mut log = self.log.borrow_mut();
        let refused = log.reject_all
            || log.accept_budget == Some(0)
            || log.rejected_categories.contains(write.category());
        if refused {
            log.rejected += 1;
            trace!(category = write.category(), "memory device rejected write");
            return false;
        }
        if let Some(budget) = log.accept_budget.as_mut() {
            *budget -= 1;
        }
        log.writes.push(write);
        true
    }
}

impl Device for MemoryDevice {
    fn commit_key(&mut self, layer: u8, row: u8, col: u8, keycode: u16) -> bool {
        self.record(DeviceWrite::Key {
            layer,
            row,
            col,
            keycode,
        })
    }

    fn commit_encoder(&mut self, layer: u8, index: u8, direction: u8, keycode: u16) -> bool {
        self.record(DeviceWrite::Encoder {
            layer,
            index,
            direction,
            keycode,
        })
    }

    fn commit_combo(&mut self, index: u16, entry: &ComboEntry) -> bool {
        self.record(DeviceWrite::Combo {
            index,
            entry: *entry,
        })
    }

    fn commit_tap_dance(&mut self, index: u16, entry: &TapDanceEntry) -> bool {
        self.record(DeviceWrite::TapDance {
            index,
            entry: *entry,
        })
    }

    fn commit_key_override(&mut self, index: u16, entry: &KeyOverrideEntry) -> bool {
        self.record(DeviceWrite::KeyOverride {
            index,
            entry: *entry,
        })
    }

    fn commit_alt_repeat_key(&mut self, index: u16, entry: &AltRepeatEntry) -> bool {
        self.record(DeviceWrite::AltRepeatKey {
            index,
            entry: *entry,
        })
    }

    fn commit_leader(&mut self, index: u16, entry: &LeaderEntry) -> bool {
        self.record(DeviceWrite::Leader {
            index,
            entry: *entry,
        })
    }

    fn commit_macro(&mut self, buffer: &[u8]) -> bool {
        self.record(DeviceWrite::Macro {
            buffer: buffer.to_vec(),
        })
    }

    fn commit_qmk_setting(&mut self, qsid: u16, value: u32) -> bool {
        self.record(DeviceWrite::QmkSetting { qsid, value })
    }

    fn commit_custom_value(&mut self, channel: u8, value_id: u8, data: &[u8]) -> bool {
        self.record(DeviceWrite::CustomValue {
            channel,
            value_id,
            data: data.to_vec(),
        })
    }

    fn commit_board_settings(&mut self, settings: &SettingsBlock) -> bool {
        self.record(DeviceWrite::BoardSettings {
            settings: settings.clone(),
        })
    }

    fn commit_layer_color(&mut self, layer: u8, color: Hsv) -> bool {
        self.record(DeviceWrite::LayerColor { layer, color })
    }

    fn commit_oneshot(&mut self, settings: OneShotSettings) -> bool {
        self.record(DeviceWrite::OneShot { settings })
    }

    fn commit_fragment_selection(&mut self, instance_idx: u8, option_index: u8) -> bool {
        self.record(DeviceWrite::FragmentSelection {
            instance_idx,
            option_index,
        })
    }
}
