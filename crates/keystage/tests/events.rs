//! Notification tests for the change manager.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use keystage::{
    ChangeEvent, ChangeKey, ChangeManager, Keyboard, KeyboardView, KeymapChange, MAX_QUEUED_EDITS,
    MemoryDevice, Subscription, TargetId,
};

type Log = Rc<RefCell<Vec<ChangeEvent>>>;

fn setup() -> (ChangeManager, MemoryDevice, Log, Subscription) {
    let device = MemoryDevice::new();
    let mut manager = ChangeManager::default();
    manager.set_active_target(Some(Keyboard::new(
        TargetId::new(1),
        KeyboardView::default(),
        device.clone(),
    )));
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let sub = manager.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    (manager, device, log, sub)
}

fn take(log: &Log) -> Vec<ChangeEvent> {
    std::mem::take(&mut *log.borrow_mut())
}

fn keys(cols: &[u8]) -> BTreeSet<ChangeKey> {
    cols.iter().map(|&c| ChangeKey::keymap(0, 0, c)).collect()
}

fn edit(col: u8, old: u16, new: u16) -> KeymapChange {
    KeymapChange::new(0, 0, col, old, new)
}

#[test]
fn first_stage_reports_every_transition() {
    let (mut manager, _device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::CanUndoChanged(true),
            ChangeEvent::CanPushChanged(true),
            ChangeEvent::ModifiedKeysChanged(keys(&[0])),
            ChangeEvent::StateChanged,
        ]
    );
}

#[test]
fn unchanged_values_are_not_re_emitted() {
    let (mut manager, _device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    // Same key merges: only the state change fires.
    manager.stage(edit(0, 1, 2)).unwrap();
    assert_eq!(take(&log), vec![ChangeEvent::StateChanged]);
}

#[test]
fn modified_keys_fire_on_membership_change() {
    let (mut manager, _device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    manager.stage(edit(1, 0, 1)).unwrap();
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::ModifiedKeysChanged(keys(&[0, 1])),
            ChangeEvent::StateChanged,
        ]
    );
}

#[test]
fn push_emits_pushed_last() {
    let (mut manager, _device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    assert!(manager.push());
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::CanPushChanged(false),
            ChangeEvent::ModifiedKeysChanged(BTreeSet::new()),
            ChangeEvent::StateChanged,
            ChangeEvent::Pushed,
        ]
    );
}

#[test]
fn failed_push_is_silent() {
    let (mut manager, device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    device.reject_all(true);
    assert!(!manager.push());
    assert!(take(&log).is_empty());
}

#[test]
fn undo_and_redo_report_restored_keys() {
    let (mut manager, _device, log, _sub) = setup();
    manager.begin_group("Swap");
    manager.stage(edit(3, 0, 1)).unwrap();
    manager.stage(edit(4, 0, 1)).unwrap();
    manager.end_group();
    take(&log);

    assert!(manager.undo());
    let events = take(&log);
    assert_eq!(
        events.last(),
        Some(&ChangeEvent::ValuesRestored(keys(&[3, 4])))
    );
    assert!(events.contains(&ChangeEvent::CanRedoChanged(true)));
    assert!(events.contains(&ChangeEvent::CanUndoChanged(false)));

    assert!(manager.redo());
    assert_eq!(
        take(&log).last(),
        Some(&ChangeEvent::ValuesRestored(keys(&[3, 4])))
    );
}

#[test]
fn staging_inside_group_still_notifies() {
    let (mut manager, _device, log, _sub) = setup();
    manager.begin_group("Fill");
    assert!(take(&log).is_empty());

    manager.stage(edit(0, 0, 1)).unwrap();
    assert!(take(&log).contains(&ChangeEvent::CanPushChanged(true)));

    manager.end_group();
    assert_eq!(
        take(&log),
        vec![ChangeEvent::CanUndoChanged(true), ChangeEvent::StateChanged]
    );
}

#[test]
fn revert_all_reports_restored_keys() {
    let (mut manager, _device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    manager.stage(edit(2, 0, 1)).unwrap();
    take(&log);

    manager.revert_all();
    assert_eq!(
        take(&log).last(),
        Some(&ChangeEvent::ValuesRestored(keys(&[0, 2])))
    );
}

#[test]
fn immediate_toggle_notifies_and_hides_pending() {
    let (mut manager, device, log, _sub) = setup();
    device.reject_all(true);
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    manager.toggle_immediate(true);
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::CanPushChanged(false),
            ChangeEvent::ImmediateChanged(true),
            ChangeEvent::ModifiedKeysChanged(BTreeSet::new()),
            ChangeEvent::StateChanged,
        ]
    );

    manager.toggle_immediate(true);
    assert!(take(&log).is_empty());
}

#[test]
fn switching_targets_re_evaluates_state() {
    let (mut manager, _device, log, _sub) = setup();
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    let previous = manager.set_active_target(None);
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::CanUndoChanged(false),
            ChangeEvent::CanPushChanged(false),
            ChangeEvent::ModifiedKeysChanged(BTreeSet::new()),
            ChangeEvent::StateChanged,
        ]
    );

    manager.set_active_target(previous);
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::CanUndoChanged(true),
            ChangeEvent::CanPushChanged(true),
            ChangeEvent::ModifiedKeysChanged(keys(&[0])),
            ChangeEvent::StateChanged,
        ]
    );
}

#[test]
fn dropped_subscription_stops_delivery() {
    let (mut manager, _device, log, sub) = setup();
    drop(sub);
    manager.stage(edit(0, 0, 1)).unwrap();
    assert!(log.borrow().is_empty());
    assert_eq!(manager.events().subscriber_count(), 0);
}

#[test]
fn handlers_observe_final_state() {
    let (mut manager, _device, _log, _sub) = setup();
    let bus = manager.events().clone();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _late = bus.subscribe(move |event| {
        if let ChangeEvent::ModifiedKeysChanged(keys) = event {
            sink.borrow_mut().push(keys.len());
        }
    });

    manager.stage(edit(0, 0, 1)).unwrap();
    manager.stage(edit(1, 0, 1)).unwrap();
    manager.undo();
    assert_eq!(*seen.borrow(), vec![1, 2, 1]);
}

#[test]
fn handler_queued_edit_is_staged_after_push() {
    let (mut manager, device, log, _sub) = setup();
    let queue = manager.edit_queue();
    let _follow_up = manager.subscribe(move |event| {
        if *event == ChangeEvent::Pushed {
            queue.push(edit(9, 0, 1));
        }
    });
    manager.stage(edit(0, 0, 1)).unwrap();
    take(&log);

    assert!(manager.push());
    assert_eq!(device.keycode_at(0, 0, 0), Some(1));
    assert!(manager.is_modified(&ChangeKey::keymap(0, 0, 9)));
    assert_eq!(manager.pending_count(), 1);
    assert_eq!(manager.undo_depth(), 2);
    assert!(manager.edit_queue().is_empty());
    assert_eq!(
        take(&log),
        vec![
            ChangeEvent::CanPushChanged(false),
            ChangeEvent::ModifiedKeysChanged(BTreeSet::new()),
            ChangeEvent::StateChanged,
            ChangeEvent::Pushed,
            ChangeEvent::CanPushChanged(true),
            ChangeEvent::ModifiedKeysChanged(keys(&[9])),
            ChangeEvent::StateChanged,
        ]
    );
}

#[test]
fn handler_that_always_queues_terminates() {
    let (mut manager, _device, _log, _sub) = setup();
    let queue = manager.edit_queue();
    let next = Rc::new(Cell::new(1u16));
    let counter = Rc::clone(&next);
    let _runaway = manager.subscribe(move |event| {
        if *event == ChangeEvent::StateChanged {
            let old = counter.get();
            counter.set(old + 1);
            queue.push(edit(5, old, old + 1));
        }
    });

    manager.stage(edit(5, 0, 1)).unwrap();
    assert!(manager.edit_queue().is_empty());
    assert_eq!(manager.undo_depth(), 1 + MAX_QUEUED_EDITS);
    assert_eq!(manager.pending_count(), 1);
}

#[test]
fn edits_queued_outside_handlers_stage_on_next_dispatch() {
    let (mut manager, _device, _log, _sub) = setup();
    let queue = manager.edit_queue();
    queue.push(edit(3, 0, 1));
    queue.push(edit(4, 0, 1));

    // The queue is drained by the next dispatch.
    manager.stage(edit(0, 0, 1)).unwrap();
    assert_eq!(manager.modified_keys(), keys(&[0, 3, 4]));
    assert_eq!(manager.undo_names(10), vec!["Change"; 3]);
}
