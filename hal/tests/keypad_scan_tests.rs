//! Scanner tests against the simulated keypad matrix

use std::time::Duration;
use keyserial_hal::GpioError;
use keyserial_hal::keypad::{
    KEYPAD_COLS, KEYPAD_LAYOUT, KEYPAD_ROWS, Keypad, KeypadKey, KeypadMatrix, KeypadPins,
    KeypadScanner,
};
use keyserial_hal::sim::SimKeypad;
use proptest::prelude::*;

const ROW_PINS: [usize; 4] = [4, 5, 6, 7];
const COL_PINS: [usize; 4] = [8, 9, 10, 11];

fn scanner(sim: &SimKeypad) -> KeypadScanner<&SimKeypad> {
    let scanner = KeypadScanner::new(sim).with_debounce(Duration::ZERO);
    scanner.init().unwrap();
    scanner
}

fn scan_chars(scanner: &KeypadScanner<&SimKeypad>) -> String {
    let mut out = String::new();
    scanner
        .scan_pass(|key| {
            out.push(key.to_char());
            Ok(())
        })
        .unwrap();
    out
}

proptest! {
    #[test]
    fn test_sole_closure_emits_its_key(row in 0..KEYPAD_ROWS, col in 0..KEYPAD_COLS, hold in 1usize..20) {
        let sim = SimKeypad::new(ROW_PINS, COL_PINS);
        let scanner = scanner(&sim);
        sim.press(row, col, hold).unwrap();

        let out = scan_chars(&scanner);

        prop_assert_eq!(out, KEYPAD_LAYOUT[row][col].to_char().to_string());
        prop_assert_eq!(sim.pending_presses(), 0);
    }
}

#[test]
fn test_every_position_maps_through_layout() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);

    let mut out = String::new();
    for row in 0..KEYPAD_ROWS {
        for col in 0..KEYPAD_COLS {
            sim.press(row, col, 1).unwrap();
            out.push_str(&scan_chars(&scanner));
        }
    }

    assert_eq!(out, "123A456B789C*0#D");
}

#[test]
fn test_no_press_emits_nothing() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);

    let count = scanner.scan_pass(|_| panic!("no key is pressed")).unwrap();

    assert_eq!(count, 0);
    assert_eq!(sim.take_reads().len(), KEYPAD_ROWS * KEYPAD_COLS);
}

#[test]
fn test_held_key_emits_once_until_released() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);

    sim.press(2, 1, 50).unwrap();
    assert_eq!(scan_chars(&scanner), "8");
    assert_eq!(sim.pending_presses(), 0);

    assert_eq!(scan_chars(&scanner), "");

    sim.press(2, 1, 50).unwrap();
    assert_eq!(scan_chars(&scanner), "8");
}

#[test]
fn test_release_wait_polls_the_pressed_column() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);
    sim.press(0, 0, 5).unwrap();

    scan_chars(&scanner);

    let reads = sim.take_reads();
    // Detection, 4 more low reads while held, 1 high read on release.
    let col0_row0: Vec<bool> = reads
        .iter()
        .filter(|r| r.col == 0 && r.active_rows() == vec![0])
        .map(|r| r.level)
        .collect();
    assert_eq!(col0_row0, vec![false, false, false, false, false, true]);
}

#[test]
fn test_reads_happen_with_exactly_one_row_strobed() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);
    sim.press(2, 1, 3).unwrap();

    scan_chars(&scanner);

    let reads = sim.take_reads();
    assert!(!reads.is_empty());
    for read in &reads {
        assert_eq!(read.active_rows().len(), 1, "{:?}", read);
    }
    for read in reads.iter().filter(|r| r.active_rows() != vec![2]) {
        assert!(read.level, "closure on row 2 leaked into {:?}", read);
    }
    assert_eq!(sim.row_levels(), [true; KEYPAD_ROWS]);
}

#[test]
fn test_row_is_released_when_report_fails() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);
    sim.press(1, 2, 1).unwrap();

    let result = scanner.scan_pass(|_| Err(GpioError::Other("sink gone".into())));

    assert_eq!(result, Err(GpioError::Other("sink gone".into())));
    assert_eq!(sim.row_levels(), [true; KEYPAD_ROWS]);
}

#[test]
fn test_snapshot_read_reports_closed_key_without_blocking() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);

    assert!(scanner.read().unwrap().is_empty());

    sim.press(1, 3, 100).unwrap();
    assert_eq!(scanner.read().unwrap(), vec![KeypadKey::KeyB]);
    assert_eq!(sim.pending_presses(), 1);
}

#[test]
fn test_same_row_closures_report_in_column_order() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);
    sim.press(1, 2, 100).unwrap();
    sim.press(1, 0, 100).unwrap();

    let mut out = String::new();
    scanner
        .scan_pass(|key| {
            if key == KeypadKey::Key6 {
                // The release wait on column 0 finished before column 2 was read.
                assert_eq!(sim.held_keys(), vec![(1, 2)]);
            }
            out.push(key.to_char());
            Ok(())
        })
        .unwrap();

    assert_eq!(out, "46");
    assert!(sim.held_keys().is_empty());
}

#[test]
fn test_snapshot_read_reports_every_closed_key() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let scanner = scanner(&sim);
    sim.press(1, 2, 100).unwrap();
    sim.press(1, 0, 100).unwrap();

    assert_eq!(scanner.read().unwrap(), vec![KeypadKey::Key4, KeypadKey::Key6]);
    assert_eq!(sim.held_keys().len(), 2);
}

#[test]
fn test_repeated_press_extends_the_hold() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    sim.press(0, 1, 2).unwrap();
    sim.press(0, 1, 3).unwrap();

    assert_eq!(sim.held_keys(), vec![(0, 1)]);
    assert_eq!(sim.pending_presses(), 1);
}

#[test]
fn test_gpio_matrix_enables_column_pull_ups() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    assert_eq!(sim.col_pull_ups(), [false; KEYPAD_COLS]);

    let _pins = KeypadPins::claim(&sim, ROW_PINS, COL_PINS).unwrap();

    assert_eq!(sim.col_pull_ups(), [true; KEYPAD_COLS]);
}

#[test]
fn test_matrix_init_only_drives_rows() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let mut pins = KeypadPins::claim(&sim, ROW_PINS, COL_PINS).unwrap();
    let matrix = pins.matrix().unwrap();
    matrix.set_row_active(2).unwrap();

    matrix.init().unwrap();

    assert_eq!(sim.row_levels(), [true; KEYPAD_ROWS]);
    assert_eq!(sim.col_pull_ups(), [true; KEYPAD_COLS]);

    let unclaimed = SimKeypad::new(ROW_PINS, COL_PINS);
    unclaimed.init().unwrap();
    assert_eq!(unclaimed.col_pull_ups(), [false; KEYPAD_COLS]);
}

#[test]
fn test_gpio_matrix_claims_pins_exclusively() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);

    let pins = KeypadPins::claim(&sim, ROW_PINS, COL_PINS).unwrap();
    assert_eq!(
        KeypadPins::claim(&sim, ROW_PINS, COL_PINS).unwrap_err(),
        GpioError::AlreadyInUse,
    );

    drop(pins);
    assert!(KeypadPins::claim(&sim, ROW_PINS, COL_PINS).is_ok());
}

#[test]
fn test_gpio_matrix_rejects_unknown_pins() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);

    let result = KeypadPins::claim(&sim, [4, 5, 6, 30], COL_PINS);

    assert_eq!(result.unwrap_err(), GpioError::InvalidArgument);
}

#[test]
fn test_gpio_matrix_scans_through_pins() {
    let sim = SimKeypad::new(ROW_PINS, COL_PINS);
    let mut pins = KeypadPins::claim(&sim, ROW_PINS, COL_PINS).unwrap();
    let matrix = pins.matrix().unwrap();
    let scanner = KeypadScanner::new(&matrix).with_debounce(Duration::ZERO);
    scanner.init().unwrap();

    sim.press(3, 0, 4).unwrap();
    sim.press(0, 3, 2).unwrap();

    let mut keys = Vec::new();
    scanner
        .scan_pass(|key| {
            keys.push(key);
            Ok(())
        })
        .unwrap();

    // Both are held together; rows are strobed top to bottom.
    assert_eq!(keys, vec![KeypadKey::KeyA, KeypadKey::KeyAsterisk]);
    assert_eq!(sim.pending_presses(), 0);
    assert_eq!(sim.row_levels(), [true; KEYPAD_ROWS]);
}
