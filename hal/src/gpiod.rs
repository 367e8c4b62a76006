//! Keypad matrix over the Linux GPIO character device, using the gpiod library.
use crate::keypad::{KEYPAD_COLS, KEYPAD_ROWS, KeypadMatrix};
use crate::{GpioBias, GpioError, GpioResult};
use log::debug;
use std::cell::Cell;
use std::fmt::{Debug, Formatter};

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

/// GpiodKeypadMatrix requests the row lines as outputs and the column lines as inputs,
/// both pulled up.
///
/// Row lines are requested together, so every row change rewrites all four levels.
pub struct GpiodKeypadMatrix {
    chip_name: String,
    rows: gpiod::Lines<gpiod::Output>,
    cols: gpiod::Lines<gpiod::Input>,
    row_levels: Cell<[bool; KEYPAD_ROWS]>,
}

impl GpiodKeypadMatrix {
    pub fn open(
        chip_path: &str,
        rows: [u32; KEYPAD_ROWS],
        cols: [u32; KEYPAD_COLS],
    ) -> GpioResult<Self> {
        let chip = gpiod::Chip::new(chip_path)?;
        debug!("Opened {} ({} lines)", chip.name(), chip.num_lines());

        let row_lines = chip.request_lines(
            gpiod::Options::output(rows)
                .values([true; KEYPAD_ROWS])
                .consumer(env!("CARGO_PKG_NAME"))
                .bias(GpioBias::PullUp.into()),
        )?;
        let col_lines = chip.request_lines(
            gpiod::Options::input(cols)
                .consumer(env!("CARGO_PKG_NAME"))
                .bias(GpioBias::PullUp.into()),
        )?;

        Ok(GpiodKeypadMatrix {
            chip_name: chip.name().to_string(),
            rows: row_lines,
            cols: col_lines,
            row_levels: Cell::new([true; KEYPAD_ROWS]),
        })
    }

    fn drive_row(&self, row: usize, high: bool) -> GpioResult<()> {
        let mut levels = self.row_levels.get();
        *levels.get_mut(row).ok_or(GpioError::InvalidArgument)? = high;
        self.rows.set_values(levels)?;
        self.row_levels.set(levels);
        Ok(())
    }
}

impl Debug for GpiodKeypadMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodKeypadMatrix({})", self.chip_name)
    }
}

impl KeypadMatrix for GpiodKeypadMatrix {
    fn init(&self) -> GpioResult<()> {
        let levels = [true; KEYPAD_ROWS];
        self.rows.set_values(levels)?;
        self.row_levels.set(levels);
        Ok(())
    }

    fn set_row_active(&self, row: usize) -> GpioResult<()> {
        self.drive_row(row, false)
    }

    fn set_row_idle(&self, row: usize) -> GpioResult<()> {
        self.drive_row(row, true)
    }

    fn read_column(&self, col: usize) -> GpioResult<bool> {
        if col >= KEYPAD_COLS {
            return Err(GpioError::InvalidArgument);
        }
        let values = self.cols.get_values([false; KEYPAD_COLS])?;
        Ok(values[col])
    }
}
