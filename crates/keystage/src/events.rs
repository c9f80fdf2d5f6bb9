#![forbid(unsafe_code)]

//! Change notifications.
//!
//! # Design
//!
//! [`EventBus`] is a callback registry in shared, reference-counted storage.
//! Subscribers are held as `Weak` references; the strong `Rc` lives in the
//! [`Subscription`] guard returned by [`EventBus::subscribe`], so dropping
//! the guard unsubscribes. Dead entries are pruned on the next emission.
//!
//! [`EmittedState`] caches the last value of every de-duplicated
//! notification. The manager compares fresh state against it and only emits
//! the notifications whose value moved.
//!
//! # Failure Modes
//!
//! - **Subscribing during dispatch**: safe. Callbacks are collected before
//!   any of them runs, so a callback registered mid-dispatch first fires on
//!   the next emission.
//! - **Calling back into the manager**: the manager is mutably borrowed
//!   while it dispatches. Handlers that need to stage follow-up edits push
//!   them onto an [`EditQueue`]; the manager stages them once dispatch
//!   finishes, up to [`MAX_QUEUED_EDITS`] per operation so handler loops
//!   terminate.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::change::Change;
use crate::key::ChangeKey;

/// Queued edits staged after a single dispatch before the rest are dropped.
pub const MAX_QUEUED_EDITS: usize = 256;

/// A notification about the active target's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Fired after every mutating operation.
    StateChanged,
    CanUndoChanged(bool),
    CanRedoChanged(bool),
    /// Whether a push would send anything.
    CanPushChanged(bool),
    /// The full set of staged keys.
    ModifiedKeysChanged(BTreeSet<ChangeKey>),
    ImmediateChanged(bool),
    /// Slots whose display value was rewritten by undo, redo or revert.
    ValuesRestored(BTreeSet<ChangeKey>),
    /// A push completed with every write accepted.
    Pushed,
}

type CallbackRc = Rc<dyn Fn(&ChangeEvent)>;
type CallbackWeak = Weak<dyn Fn(&ChangeEvent)>;

/// Shared callback registry.
///
/// Cloning an `EventBus` creates a new handle to the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Rc<RefCell<Vec<CallbackWeak>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It stays registered until the returned guard is
    /// dropped.
    pub fn subscribe(&self, callback: impl Fn(&ChangeEvent) + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        self.subscribers.borrow_mut().push(Rc::downgrade(&strong));
        Subscription { _guard: strong }
    }

    /// Number of registered subscribers, including dropped ones not yet
    /// pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Deliver events in order to every live subscriber, in registration
    /// order.
    pub fn emit_all(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let callbacks: Vec<CallbackRc> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|w| w.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for event in events {
            for callback in &callbacks {
                callback(event);
            }
        }
    }

    pub fn emit(&self, event: &ChangeEvent) {
        self.emit_all(std::slice::from_ref(event));
    }
}

/// RAII guard for a subscriber callback.
pub struct Subscription {
    _guard: CallbackRc,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Edits waiting to be staged by the manager that owns the queue.
///
/// Cloning creates a new handle to the same queue, so a handler can capture
/// one and push edits while the manager is busy dispatching.
#[derive(Clone, Default)]
pub struct EditQueue {
    edits: Rc<RefCell<VecDeque<Change>>>,
}

impl fmt::Debug for EditQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl EditQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an edit. The display is expected to show it already.
    pub fn push(&self, change: impl Into<Change>) {
        self.edits.borrow_mut().push_back(change.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edits.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.borrow().is_empty()
    }

    pub(crate) fn pop(&self) -> Option<Change> {
        self.edits.borrow_mut().pop_front()
    }

    /// Drop every queued edit, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let mut edits = self.edits.borrow_mut();
        let dropped = edits.len();
        edits.clear();
        dropped
    }
}

/// Snapshot of the de-duplicated notification values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmittedState {
    pub can_undo: bool,
    pub can_redo: bool,
    pub can_push: bool,
    pub immediate: bool,
    pub modified_keys: BTreeSet<ChangeKey>,
}

impl EmittedState {
    /// Record `next` and return the notifications for every value that
    /// differs from the cached one, followed by `StateChanged`.
    pub fn update(&mut self, next: Self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        if next.can_undo != self.can_undo {
            events.push(ChangeEvent::CanUndoChanged(next.can_undo));
        }
        if next.can_redo != self.can_redo {
            events.push(ChangeEvent::CanRedoChanged(next.can_redo));
        }
        if next.can_push != self.can_push {
            events.push(ChangeEvent::CanPushChanged(next.can_push));
        }
        if next.immediate != self.immediate {
            events.push(ChangeEvent::ImmediateChanged(next.immediate));
        }
        if next.modified_keys != self.modified_keys {
            events.push(ChangeEvent::ModifiedKeysChanged(next.modified_keys.clone()));
        }
        events.push(ChangeEvent::StateChanged);
        *self = next;
        events
    }
}
