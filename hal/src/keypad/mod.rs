mod gpio;
mod key;
mod scanner;

use std::fmt::Debug;
use crate::GpioResult;
pub use gpio::*;
pub use key::*;
pub use scanner::*;

/// Number of row lines of the keypad matrix.
pub const KEYPAD_ROWS: usize = 4;
/// Number of column lines of the keypad matrix.
pub const KEYPAD_COLS: usize = 4;

/// The `Keypad` trait defines the interface for keypad input devices.
pub trait Keypad: Debug {
    type Key;

    /// Returns every key closed right now, without waiting or debouncing.
    fn read(&self) -> GpioResult<Vec<Self::Key>>;
}

/// Electrical interface of a row-strobed keypad matrix.
///
/// Rows idle high and are strobed low one at a time; columns are pulled up,
/// so a column reads low only while a closed key connects it to a strobed row.
pub trait KeypadMatrix: Debug {
    /// Puts every row in the idle (high) state.
    ///
    /// Column pull-ups are not touched here: they are set when the lines are claimed,
    /// by [KeypadPins::claim] or [GpiodKeypadMatrix::open](crate::gpiod::GpiodKeypadMatrix::open).
    fn init(&self) -> GpioResult<()>;

    /// Drives `row` low.
    fn set_row_active(&self, row: usize) -> GpioResult<()>;

    /// Releases `row` back to high.
    fn set_row_idle(&self, row: usize) -> GpioResult<()>;

    /// Reads the level of `col`: `true` for high (idle), `false` for low (pressed).
    fn read_column(&self, col: usize) -> GpioResult<bool>;
}

impl<T: KeypadMatrix + ?Sized> KeypadMatrix for &T {
    fn init(&self) -> GpioResult<()> {
        (**self).init()
    }

    fn set_row_active(&self, row: usize) -> GpioResult<()> {
        (**self).set_row_active(row)
    }

    fn set_row_idle(&self, row: usize) -> GpioResult<()> {
        (**self).set_row_idle(row)
    }

    fn read_column(&self, col: usize) -> GpioResult<bool> {
        (**self).read_column(col)
    }
}
