//! End-to-end undo/redo scenarios through the application core.

use kilotone::app::AppCore;
use kilotone::command::{CloneDepth, Command, Origin, OrderPattern, PatternEdit};
use kt_ir::{save_song, MAX_CHANS};

fn pattern_edit(channel: i32, pattern: i32, row: i32, field: i32, value: i16) -> PatternEdit {
    PatternEdit {
        channel,
        pattern,
        row,
        field,
        value,
    }
}

#[test]
fn order_add_undo_round_trip() {
    let mut core = AppCore::new();
    assert_eq!(core.song.orders_len(), 0);

    // Exec: the new order exists on every channel.
    assert!(core
        .perform(Command::order_add(None, 0, CloneDepth::Shallow), Origin::Local)
        .is_some());
    assert_eq!(core.song.orders_len(), 1);
    for channel in 0..MAX_CHANS {
        assert_eq!(core.song.order_cell(channel, 0), 0);
    }
    let after_add = save_song(&core.song);

    // Revert: the order is removed.
    assert!(core.undo());
    assert_eq!(core.song.orders_len(), 0);

    // Redo: state matches the first exec.
    assert!(core.redo());
    assert_eq!(save_song(&core.song), after_add);
}

#[test]
fn partial_pattern_edit_records_only_changes() {
    let mut core = AppCore::new();
    core.song
        .pattern_mut(2, 5, true)
        .unwrap()
        .set_cell(10, 0, 60);
    core.song
        .pattern_mut(2, 5, true)
        .unwrap()
        .set_cell(10, 3, 15);

    // First edit is a no-op, second is a change.
    let edits = vec![
        pattern_edit(2, 5, 10, 0, 60),
        pattern_edit(2, 5, 10, 3, 12),
    ];
    let done = core
        .perform(Command::pattern_set(edits), Origin::Local)
        .expect("modified");

    match &done {
        Command::PatternSet { revert, .. } => {
            assert_eq!(revert.as_slice(), &[pattern_edit(2, 5, 10, 3, 15)]);
        }
        other => panic!("unexpected command shape: {:?}", other),
    }
    assert_eq!(core.song.pattern(2, 5).unwrap().cell(10, 3), 12);

    // Revert restores the old volume and leaves the note alone.
    assert!(core.undo());
    assert_eq!(core.song.pattern(2, 5).unwrap().cell(10, 3), 15);
    assert_eq!(core.song.pattern(2, 5).unwrap().cell(10, 0), 60);
}

#[test]
fn all_noop_pattern_edit_reports_unmodified() {
    let mut core = AppCore::new();
    core.song
        .pattern_mut(0, 0, true)
        .unwrap()
        .set_cell(4, 0, 48);

    let done = core.perform(
        Command::pattern_set(vec![pattern_edit(0, 0, 4, 0, 48)]),
        Origin::Local,
    );
    assert!(done.is_none());
    assert!(!core.undo.can_undo());
}

#[test]
fn out_of_bounds_pattern_edit_fails_without_undo_entry() {
    let mut core = AppCore::new();
    let done = core.perform(
        Command::pattern_set(vec![pattern_edit(99, 0, 0, 0, 1)]),
        Origin::Local,
    );
    assert!(done.is_none());
    assert!(!core.undo.can_undo());
}

#[test]
fn undo_truncates_redo_tail() {
    let mut core = AppCore::new();
    for i in 0..3 {
        core.perform(
            Command::order_add(None, i, CloneDepth::Shallow),
            Origin::Local,
        );
    }
    assert_eq!(core.undo.len(), 3);

    core.undo();
    core.undo();
    assert_eq!(core.undo.current_point(), 1);
    assert_eq!(core.undo.len(), 3);

    core.perform(
        Command::order_add(None, 1, CloneDepth::Shallow),
        Origin::Local,
    );
    assert_eq!(core.undo.len(), 2);
    assert_eq!(core.undo.current_point(), 2);
}

#[test]
fn order_delete_revert_restores_row() {
    let mut core = AppCore::new();
    core.perform(
        Command::order_add(None, 0, CloneDepth::Shallow),
        Origin::Local,
    );
    core.perform(
        Command::order_add(None, 1, CloneDepth::Shallow),
        Origin::Local,
    );
    core.perform(
        Command::order_set(vec![OrderPattern {
            order: 1,
            channel: 3,
            pattern: 42,
        }]),
        Origin::Local,
    );
    let before = save_song(&core.song);

    assert!(core
        .perform(Command::order_delete(1), Origin::Local)
        .is_some());
    assert_eq!(core.song.orders_len(), 1);

    assert!(core.undo());
    assert_eq!(save_song(&core.song), before);
    assert_eq!(core.song.order_cell(3, 1), 42);
}

#[test]
fn order_swap_round_trips_by_self_inverse() {
    let mut core = AppCore::new();
    for i in 0..2 {
        core.perform(
            Command::order_add(None, i, CloneDepth::Shallow),
            Origin::Local,
        );
    }
    core.perform(
        Command::order_set(vec![
            OrderPattern { order: 0, channel: 0, pattern: 7 },
            OrderPattern { order: 1, channel: 0, pattern: 9 },
        ]),
        Origin::Local,
    );
    let before = save_song(&core.song);

    core.perform(Command::order_swap(0, 1), Origin::Local);
    assert_eq!(core.song.order_cell(0, 0), 9);
    assert!(core.undo());
    assert_eq!(save_song(&core.song), before);
}

#[test]
fn degenerate_order_swap_still_reports_modified() {
    let mut core = AppCore::new();
    core.perform(
        Command::order_add(None, 0, CloneDepth::Shallow),
        Origin::Local,
    );
    // Swapping an order with itself keeps reporting modified.
    assert!(core
        .perform(Command::order_swap(0, 0), Origin::Local)
        .is_some());
}

#[test]
fn order_set_partial_out_of_bounds_keeps_visited_cells() {
    let mut core = AppCore::new();
    core.perform(
        Command::order_add(None, 0, CloneDepth::Shallow),
        Origin::Local,
    );

    // The first cell lands before the second is rejected.
    let done = core.perform(
        Command::order_set(vec![
            OrderPattern { order: 0, channel: 0, pattern: 5 },
            OrderPattern { order: 0, channel: 999, pattern: 5 },
        ]),
        Origin::Local,
    );
    assert!(done.is_none());
    assert_eq!(core.song.order_cell(0, 0), 5);
    assert!(!core.undo.can_undo());
}

#[test]
fn instrument_update_undo_restores_snapshot() {
    let mut core = AppCore::new();
    core.song.instruments.push(kt_ir::Instrument::new("lead"));

    let update = kt_ir::InstrumentUpdate {
        fm: Some(kt_ir::FmParamsUpdate {
            fb: Some(6),
            preset: Some(2),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert!(core
        .perform(Command::instrument_update(0, update.clone()), Origin::Local)
        .is_some());
    assert_eq!(core.song.instruments[0].fm.fb, 6);

    // Applying the identical update again changes nothing.
    assert!(core
        .perform(Command::instrument_update(0, update), Origin::Local)
        .is_none());

    assert!(core.undo());
    assert_eq!(core.song.instruments[0].fm.fb, 0);
    assert_eq!(core.song.instruments[0].fm.preset, 0);
}

#[test]
fn deep_clone_order_copies_patterns_and_reverts() {
    let mut core = AppCore::new();
    core.perform(
        Command::order_add(None, 0, CloneDepth::Shallow),
        Origin::Local,
    );
    core.perform(
        Command::pattern_set(vec![pattern_edit(1, 0, 0, 0, 33)]),
        Origin::Local,
    );

    core.perform(
        Command::order_add(Some(0), 1, CloneDepth::Deep),
        Origin::Local,
    );
    let cloned = core.song.order_cell(1, 1) as usize;
    assert_ne!(cloned, 0);
    assert_eq!(core.song.pattern(1, cloned).unwrap().cell(0, 0), 33);

    // Reverting removes the order; the allocated pattern stays around,
    // which is fine since nothing references it.
    assert!(core.undo());
    assert_eq!(core.song.orders_len(), 1);
    assert_eq!(core.song.order_cell(1, 0), 0);
}
