//! Simulated keypad wiring and USART registers, for running the scanner and transport
//! without hardware.

use crate::keypad::{KEYPAD_COLS, KEYPAD_ROWS, KeypadMatrix};
use crate::usart::{RXC, UDRE, UsartRegister, UsartRegisters};
use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioOutput, GpioPin, GpioResult};
use bitvec::vec::BitVec;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;

/// A key closure: the key at (`row`, `col`) stays closed for `hold_reads` low column reads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimPress {
    pub row: usize,
    pub col: usize,
    pub hold_reads: usize,
}

/// One column read, with the row levels at the time it was taken.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimColumnRead {
    pub col: usize,
    pub row_levels: [bool; KEYPAD_ROWS],
    pub level: bool,
}

impl SimColumnRead {
    /// The rows driven low during the read.
    pub fn active_rows(&self) -> Vec<usize> {
        (0..KEYPAD_ROWS).filter(|&row| !self.row_levels[row]).collect()
    }
}

/// A 4x4 keypad wired to simulated pins.
///
/// Closures added with [SimKeypad::press] are held together: each one pulls its column
/// low while its row is strobed, and is released after `hold_reads` such reads.
/// Columns without a pull-up float and read low.
///
/// Usable directly as a [KeypadMatrix], where the columns behave as lines requested
/// with pull-ups, or as a [GpioDriver] exposing the eight keypad pins, where a column
/// is pulled up only once its pin's bias says so.
pub struct SimKeypad {
    row_pins: [usize; KEYPAD_ROWS],
    col_pins: [usize; KEYPAD_COLS],
    row_levels: Cell<[bool; KEYPAD_ROWS]>,
    col_pull_ups: Cell<[bool; KEYPAD_COLS]>,
    presses: RefCell<Vec<SimPress>>,
    reads: RefCell<Vec<SimColumnRead>>,
    used_pins: BitVec<AtomicU8>,
}

impl SimKeypad {
    pub fn new(row_pins: [usize; KEYPAD_ROWS], col_pins: [usize; KEYPAD_COLS]) -> Self {
        let count = row_pins.iter().chain(&col_pins).max().map_or(0, |&max| max + 1);
        SimKeypad {
            row_pins,
            col_pins,
            row_levels: Cell::new([true; KEYPAD_ROWS]),
            col_pull_ups: Cell::new([false; KEYPAD_COLS]),
            presses: RefCell::new(Vec::new()),
            reads: RefCell::new(Vec::new()),
            used_pins: BitVec::repeat(false, count),
        }
    }

    /// Closes the key at (`row`, `col`). Pressing a key already held extends its hold.
    pub fn press(&self, row: usize, col: usize, hold_reads: usize) -> GpioResult<()> {
        if row >= KEYPAD_ROWS || col >= KEYPAD_COLS {
            return Err(GpioError::InvalidArgument);
        }
        let hold_reads = hold_reads.max(1);
        let mut presses = self.presses.borrow_mut();
        match presses.iter_mut().find(|p| p.row == row && p.col == col) {
            Some(press) => press.hold_reads += hold_reads,
            None => presses.push(SimPress { row, col, hold_reads }),
        }
        Ok(())
    }

    /// Closures not yet released.
    pub fn pending_presses(&self) -> usize {
        self.presses.borrow().len()
    }

    /// Positions of the keys held right now.
    pub fn held_keys(&self) -> Vec<(usize, usize)> {
        self.presses.borrow().iter().map(|p| (p.row, p.col)).collect()
    }

    pub fn row_levels(&self) -> [bool; KEYPAD_ROWS] {
        self.row_levels.get()
    }

    pub fn col_pull_ups(&self) -> [bool; KEYPAD_COLS] {
        self.col_pull_ups.get()
    }

    /// Takes the log of column reads recorded so far.
    pub fn take_reads(&self) -> Vec<SimColumnRead> {
        self.reads.take()
    }

    fn set_row_level(&self, row: usize, high: bool) -> GpioResult<()> {
        let mut levels = self.row_levels.get();
        *levels.get_mut(row).ok_or(GpioError::InvalidArgument)? = high;
        self.row_levels.set(levels);
        Ok(())
    }

    fn set_col_pull_up(&self, col: usize, pull_up: bool) {
        let mut pull_ups = self.col_pull_ups.get();
        pull_ups[col] = pull_up;
        self.col_pull_ups.set(pull_ups);
    }

    fn column_level(&self, col: usize, pulled_up: bool) -> GpioResult<bool> {
        if col >= KEYPAD_COLS {
            return Err(GpioError::InvalidArgument);
        }

        let row_levels = self.row_levels.get();
        let mut presses = self.presses.borrow_mut();

        let mut closed = false;
        for press in presses.iter_mut() {
            if press.col == col && !row_levels[press.row] {
                closed = true;
                press.hold_reads -= 1;
            }
        }
        presses.retain(|press| press.hold_reads > 0);
        let level = !closed && pulled_up;

        self.reads.borrow_mut().push(SimColumnRead { col, row_levels, level });
        Ok(level)
    }

    fn row_of(&self, pin: usize) -> Option<usize> {
        self.row_pins.iter().position(|&p| p == pin)
    }

    fn col_of(&self, pin: usize) -> Option<usize> {
        self.col_pins.iter().position(|&p| p == pin)
    }
}

impl Debug for SimKeypad {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimKeypad(rows: {:?}, cols: {:?})", self.row_pins, self.col_pins)
    }
}

impl KeypadMatrix for SimKeypad {
    fn init(&self) -> GpioResult<()> {
        self.row_levels.set([true; KEYPAD_ROWS]);
        Ok(())
    }

    fn set_row_active(&self, row: usize) -> GpioResult<()> {
        self.set_row_level(row, false)
    }

    fn set_row_idle(&self, row: usize) -> GpioResult<()> {
        self.set_row_level(row, true)
    }

    fn read_column(&self, col: usize) -> GpioResult<bool> {
        self.column_level(col, true)
    }
}

impl GpioDriver for SimKeypad {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.used_pins.len())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        if self.row_of(index).is_none() && self.col_of(index).is_none() {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);

        Ok(Box::new(SimPin {
            keypad: self,
            pin_index: index,
        }))
    }
}

struct SimPin<'a> {
    keypad: &'a SimKeypad,
    pin_index: usize,
}

impl Debug for SimPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.keypad, self.pin_index)
    }
}

impl GpioPin for SimPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        Ok(Box::new(SimInput { pin: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if self.keypad.row_of(self.pin_index).is_none() {
            return Err(GpioError::NotSupported);
        }
        Ok(Box::new(SimOutput { pin: self }))
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        if let Some(col) = self.keypad.col_of(self.pin_index) {
            self.keypad.set_col_pull_up(col, bias == GpioBias::PullUp);
        }
        Ok(())
    }
}

impl Drop for SimPin<'_> {
    fn drop(&mut self) {
        self.keypad.used_pins.set_aliased(self.pin_index, false);
    }
}

struct SimInput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.pin)
    }
}

impl GpioInput for SimInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        let keypad = self.pin.keypad;
        match (keypad.row_of(self.pin.pin_index), keypad.col_of(self.pin.pin_index)) {
            (Some(row), _) => Ok(keypad.row_levels.get()[row]),
            (_, Some(col)) => keypad.column_level(col, keypad.col_pull_ups.get()[col]),
            _ => Err(GpioError::InvalidArgument),
        }
    }
}

struct SimOutput<'a> {
    pin: &'a SimPin<'a>,
}

impl Debug for SimOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for SimOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        let row = self.pin.keypad.row_of(self.pin.pin_index).ok_or(GpioError::NotSupported)?;
        self.pin.keypad.set_row_level(row, value)
    }
}

/// A USART register block that records what the driver does to it.
///
/// Bytes written to `UDRn` are captured, bytes queued with [SimUsartRegisters::queue_rx]
/// are served from `UDRn` with `RXC` set while any remain, and `UDRE` can be held
/// clear for a number of status polls to exercise the transmit wait.
#[derive(Debug, Default)]
pub struct SimUsartRegisters {
    registers: RefCell<HashMap<UsartRegister, u8>>,
    transmitted: RefCell<Vec<u8>>,
    received: RefCell<VecDeque<u8>>,
    tx_busy_polls: Cell<usize>,
    status_polls: Cell<usize>,
}

impl SimUsartRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `UDRE` clear for the next `polls` reads of `UCSRnA`.
    pub fn with_tx_busy_polls(self, polls: usize) -> Self {
        self.tx_busy_polls.set(polls);
        self
    }

    pub fn queue_rx(&self, bytes: &[u8]) {
        self.received.borrow_mut().extend(bytes);
    }

    /// The last value written to `register`, `0` if it was never written.
    pub fn register(&self, register: UsartRegister) -> u8 {
        self.registers.borrow().get(&register).copied().unwrap_or(0)
    }

    pub fn transmitted(&self) -> Vec<u8> {
        self.transmitted.borrow().clone()
    }

    pub fn status_polls(&self) -> usize {
        self.status_polls.get()
    }
}

impl UsartRegisters for SimUsartRegisters {
    fn read(&self, register: UsartRegister) -> u8 {
        match register {
            UsartRegister::StatusA => {
                self.status_polls.set(self.status_polls.get() + 1);

                let mut status = 0;
                match self.tx_busy_polls.get() {
                    0 => status |= UDRE,
                    busy => self.tx_busy_polls.set(busy - 1),
                }
                if !self.received.borrow().is_empty() {
                    status |= RXC;
                }
                status
            }
            UsartRegister::Data => self.received.borrow_mut().pop_front().unwrap_or(0),
            _ => self.register(register),
        }
    }

    fn write(&self, register: UsartRegister, value: u8) {
        if register == UsartRegister::Data {
            self.transmitted.borrow_mut().push(value);
        }
        self.registers.borrow_mut().insert(register, value);
    }
}
