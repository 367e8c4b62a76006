use std::time::Duration;
use log::{debug, trace};
use crate::GpioResult;
use crate::keypad::{KEYPAD_COLS, KEYPAD_ROWS, Keypad, KeypadKey, KeypadMatrix};
use crate::wait::{delay, try_spin_until};

/// Row-strobe scanner for a 4x4 keypad matrix.
///
/// A detected press blocks the whole scan: the key is reported, the debounce delay
/// elapses and then the scanner waits for that column to go high again.
/// Simultaneous presses on several rows are not resolved.
#[derive(Debug)]
pub struct KeypadScanner<M: KeypadMatrix> {
    matrix: M,
    pub debounce: Duration,
}

impl<M: KeypadMatrix> KeypadScanner<M> {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

    pub fn new(matrix: M) -> Self {
        KeypadScanner {
            matrix,
            debounce: Self::DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Drives every row idle high. Call once before scanning.
    pub fn init(&self) -> GpioResult<()> {
        self.matrix.init()
    }

    /// Runs one full pass over all rows, calling `on_press` for each detected key.
    ///
    /// Returns the number of keys reported. The strobed row is released even if
    /// `on_press` or a read fails.
    pub fn scan_pass(
        &self,
        mut on_press: impl FnMut(KeypadKey) -> GpioResult<()>,
    ) -> GpioResult<usize> {
        let mut pressed = 0;

        for row in 0..KEYPAD_ROWS {
            self.matrix.set_row_active(row)?;
            let result = self.scan_row(row, &mut on_press);
            self.matrix.set_row_idle(row)?;
            pressed += result?;
        }

        Ok(pressed)
    }

    fn scan_row(
        &self,
        row: usize,
        on_press: &mut impl FnMut(KeypadKey) -> GpioResult<()>,
    ) -> GpioResult<usize> {
        let mut pressed = 0;

        for col in 0..KEYPAD_COLS {
            if self.matrix.read_column(col)? {
                continue;
            }

            let Some(key) = KeypadKey::from_position(row, col) else {
                continue;
            };
            debug!("Key {:?} pressed at ({}, {})", key, row, col);

            on_press(key)?;
            pressed += 1;

            delay(self.debounce);
            self.wait_for_release(col)?;
            trace!("Key {:?} released", key);
        }

        Ok(pressed)
    }

    /// Blocks until `col` reads high again. Never times out.
    pub fn wait_for_release(&self, col: usize) -> GpioResult<()> {
        try_spin_until(|| self.matrix.read_column(col))
    }
}

impl<M: KeypadMatrix> Keypad for KeypadScanner<M> {
    type Key = KeypadKey;

    fn read(&self) -> GpioResult<Vec<Self::Key>> {
        let mut pressed = Vec::new();

        for row in 0..KEYPAD_ROWS {
            self.matrix.set_row_active(row)?;
            let levels: GpioResult<Vec<bool>> =
                (0..KEYPAD_COLS).map(|col| self.matrix.read_column(col)).collect();
            self.matrix.set_row_idle(row)?;

            for (col, high) in levels?.into_iter().enumerate() {
                if !high {
                    pressed.extend(KeypadKey::from_position(row, col));
                }
            }
        }

        Ok(pressed)
    }
}
