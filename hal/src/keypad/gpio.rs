use std::fmt::{Debug, Formatter};
use log::debug;
use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioOutput, GpioPin, GpioResult};
use crate::keypad::{KEYPAD_COLS, KEYPAD_ROWS, KeypadMatrix};

/// The eight GPIO pins of a keypad, claimed from a [GpioDriver] with pull-ups enabled.
///
/// Pins are released when this struct is dropped.
pub struct KeypadPins<'d> {
    rows: [Box<dyn GpioPin + 'd>; KEYPAD_ROWS],
    cols: [Box<dyn GpioPin + 'd>; KEYPAD_COLS],
}

impl Debug for KeypadPins<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeypadPins(rows: {:?}, cols: {:?})", self.rows, self.cols)
    }
}

fn claim_pulled_up<'d, const N: usize>(
    driver: &'d dyn GpioDriver,
    indices: [usize; N],
) -> GpioResult<[Box<dyn GpioPin + 'd>; N]> {
    let mut pins = Vec::with_capacity(N);
    for index in indices {
        let mut pin = driver.get_pin(index)?;
        pin.set_bias(GpioBias::PullUp)?;
        pins.push(pin);
    }
    pins.try_into().map_err(|_| GpioError::InvalidArgument)
}

impl<'d> KeypadPins<'d> {
    /// Claims the row and column pins and enables the pull-up on each of them.
    pub fn claim(
        driver: &'d dyn GpioDriver,
        rows: [usize; KEYPAD_ROWS],
        cols: [usize; KEYPAD_COLS],
    ) -> GpioResult<Self> {
        debug!("Claiming keypad pins: rows {:?}, cols {:?}", rows, cols);
        Ok(KeypadPins {
            rows: claim_pulled_up(driver, rows)?,
            cols: claim_pulled_up(driver, cols)?,
        })
    }

    /// Switches rows to outputs and columns to inputs, returning the matrix over them.
    pub fn matrix(&mut self) -> GpioResult<GpioKeypadMatrix<'_>> {
        let rows = self
            .rows
            .iter_mut()
            .map(|pin| pin.as_output())
            .collect::<GpioResult<Vec<_>>>()?;
        let cols = self
            .cols
            .iter_mut()
            .map(|pin| pin.as_input())
            .collect::<GpioResult<Vec<_>>>()?;

        Ok(GpioKeypadMatrix::new(
            rows.try_into().map_err(|_| GpioError::InvalidArgument)?,
            cols.try_into().map_err(|_| GpioError::InvalidArgument)?,
        ))
    }
}

/// A keypad matrix wired straight to GPIO pins: rows as outputs, columns as inputs.
pub struct GpioKeypadMatrix<'a> {
    rows: [Box<dyn GpioOutput + 'a>; KEYPAD_ROWS],
    cols: [Box<dyn GpioInput + 'a>; KEYPAD_COLS],
}

impl Debug for GpioKeypadMatrix<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioKeypadMatrix({:?}, {:?})", self.rows, self.cols)
    }
}

impl<'a> GpioKeypadMatrix<'a> {
    /// Creates a matrix from already configured lines.
    ///
    /// The columns are expected to have pull-ups; see [KeypadPins] for a way to set them up.
    pub fn new(
        rows: [Box<dyn GpioOutput + 'a>; KEYPAD_ROWS],
        cols: [Box<dyn GpioInput + 'a>; KEYPAD_COLS],
    ) -> Self {
        GpioKeypadMatrix { rows, cols }
    }
}

impl KeypadMatrix for GpioKeypadMatrix<'_> {
    fn init(&self) -> GpioResult<()> {
        for row in &self.rows {
            row.write(true)?;
        }
        Ok(())
    }

    fn set_row_active(&self, row: usize) -> GpioResult<()> {
        self.rows.get(row).ok_or(GpioError::InvalidArgument)?.write(false)
    }

    fn set_row_idle(&self, row: usize) -> GpioResult<()> {
        self.rows.get(row).ok_or(GpioError::InvalidArgument)?.write(true)
    }

    fn read_column(&self, col: usize) -> GpioResult<bool> {
        self.cols.get(col).ok_or(GpioError::InvalidArgument)?.read()
    }
}
