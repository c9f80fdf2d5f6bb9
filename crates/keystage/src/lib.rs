#![forbid(unsafe_code)]

//! Keystage
//!
//! Change tracking, grouped undo/redo and commit orchestration for editing
//! the configuration of a remote keyboard.
//!
//! # Key Components
//!
//! - [`ChangeManager`] - Owns per-keyboard state and drives every operation
//! - [`Change`] - Closed set of slot edits with merge, apply and revert
//! - [`Group`] - Atomic unit of undo/redo
//! - [`History`] - Bounded undo/redo stacks
//! - [`EventBus`] - Subscriber callbacks for [`ChangeEvent`]s
//! - [`Keyboard`] / [`Device`] - Display state plus the write boundary
//! - [`MemoryDevice`] - In-memory device with fault injection
//!
//! # How it fits together
//!
//! Editors mutate a [`Keyboard`]'s display state and report each edit to the
//! manager with [`ChangeManager::stage`]. The manager keeps a minimal diff
//! between display and device per keyboard, files edits into history, and
//! either writes them on [`ChangeManager::push`] (deferred discipline) or
//! straight away (immediate discipline).
//!
//! ```
//! use keystage::{ChangeManager, Keyboard, KeyboardView, KeymapChange, MemoryDevice, TargetId};
//!
//! let device = MemoryDevice::new();
//! let mut manager = ChangeManager::default();
//! manager.set_active_target(Some(Keyboard::new(
//!     TargetId::new(7),
//!     KeyboardView::default(),
//!     device.clone(),
//! )));
//!
//! manager.stage(KeymapChange::new(0, 0, 0, 0x04, 0x05)).unwrap();
//! assert!(manager.has_pending_changes());
//!
//! assert!(manager.push());
//! assert_eq!(device.keycode_at(0, 0, 0), Some(0x05));
//! assert!(!manager.has_pending_changes());
//! ```

pub mod change;
pub mod changes;
pub mod config;
pub mod entries;
pub mod error;
pub mod events;
pub mod group;
pub mod history;
pub mod key;
pub mod keyboard;
pub mod manager;
pub mod memory_device;
pub mod target;
pub mod value;

pub use change::{Change, SlotEdit};
pub use changes::{
    AltRepeatKeyChange, BoardSettingsChange, ComboChange, CustomValueChange, EncoderChange,
    FragmentSelectionChange, KeyOverrideChange, KeymapChange, LayerColorChange, LeaderChange,
    MacroChange, OneShotChange, QmkBitChange, QmkSettingChange, TapDanceChange,
};
pub use config::ManagerConfig;
pub use entries::{
    AltRepeatEntry, ComboEntry, FragmentChoice, Hsv, KeyOverrideEntry, LeaderEntry,
    OneShotSettings, SettingsBlock, TapDanceEntry,
};
pub use error::{ChangeError, ConfigError};
pub use events::{ChangeEvent, EditQueue, EventBus, MAX_QUEUED_EDITS, Subscription};
pub use group::{Group, GroupMetadata, SINGLE_CHANGE_GROUP};
pub use history::{DEFAULT_MAX_DEPTH, History, HistoryConfig, HistoryEntry};
pub use key::{ChangeKey, TargetId};
pub use keyboard::{Device, Keyboard, KeyboardView};
pub use manager::ChangeManager;
pub use memory_device::{DeviceWrite, MemoryDevice};
pub use target::TargetState;
pub use value::SlotValue;
