//! Byte-oriented, fixed-baud 8-N-1 serial transport over an ATmega-style USART register block.

mod raw;

use std::fmt::Debug;
use log::trace;
use crate::{GpioError, GpioResult};
use crate::wait::spin_until;
pub use raw::*;

/// The registers of one USART channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UsartRegister {
    /// `UCSRnA`: status flags.
    StatusA,
    /// `UCSRnB`: receiver/transmitter enable.
    ControlB,
    /// `UCSRnC`: frame format.
    ControlC,
    /// `UBRRnL`: baud divisor, low byte.
    BaudLow,
    /// `UBRRnH`: baud divisor, high byte.
    BaudHigh,
    /// `UDRn`: transmit/receive data.
    Data,
}

impl UsartRegister {
    /// Offset of the register in the data space.
    pub const fn offset(self) -> usize {
        match self {
            UsartRegister::StatusA => 0xC0,
            UsartRegister::ControlB => 0xC1,
            UsartRegister::ControlC => 0xC2,
            UsartRegister::BaudLow => 0xC4,
            UsartRegister::BaudHigh => 0xC5,
            UsartRegister::Data => 0xC6,
        }
    }

    /// One past the highest register offset.
    pub const WINDOW_LEN: usize = 0xC7;
}

// UCSRnA
pub const RXC: u8 = 1 << 7;
pub const UDRE: u8 = 1 << 5;
// UCSRnB
pub const RXEN: u8 = 1 << 4;
pub const TXEN: u8 = 1 << 3;
// UCSRnC
pub const UPM1: u8 = 1 << 5;
pub const UPM0: u8 = 1 << 4;
pub const USBS: u8 = 1 << 3;
pub const UCSZ1: u8 = 1 << 2;
pub const UCSZ0: u8 = 1 << 1;

/// Byte-wide access to a USART register block.
pub trait UsartRegisters: Debug {
    fn read(&self, register: UsartRegister) -> u8;
    fn write(&self, register: UsartRegister, value: u8);
}

impl<T: UsartRegisters + ?Sized> UsartRegisters for &T {
    fn read(&self, register: UsartRegister) -> u8 {
        (**self).read(register)
    }

    fn write(&self, register: UsartRegister, value: u8) {
        (**self).write(register, value)
    }
}

/// The value programmed into `UBRRnH:UBRRnL`, `clock / (16 * baud) - 1`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BaudDivisor(u16);

impl BaudDivisor {
    /// UBRR is 12 bits wide.
    pub const MAX: u16 = 0x0FFF;

    /// Computes the divisor for normal-speed asynchronous mode, truncating.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if `baud` is zero, the clock is too slow for it,
    ///   or the divisor does not fit the register.
    pub fn compute(clock_hz: u32, baud: u32) -> GpioResult<Self> {
        if baud == 0 {
            return Err(GpioError::InvalidArgument);
        }

        let ticks = u64::from(clock_hz) / (u64::from(baud) * 16);
        let divisor = ticks.checked_sub(1).ok_or(GpioError::InvalidArgument)?;

        if divisor > u64::from(Self::MAX) {
            return Err(GpioError::InvalidArgument);
        }

        Ok(BaudDivisor(divisor as u16))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn high(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn low(self) -> u8 {
        self.0 as u8
    }

    /// The baud rate the line actually runs at with this divisor.
    pub fn effective_baud(self, clock_hz: u32) -> u32 {
        clock_hz / (16 * (u32::from(self.0) + 1))
    }
}

/// Blocking byte transport.
pub trait SerialPort: Debug {
    /// Queues `byte` for transmission, waiting for the transmit buffer first.
    fn transmit(&mut self, byte: u8);

    /// Waits for a byte to arrive and returns it.
    fn receive(&mut self) -> u8;

    /// Transmits `data` byte by byte, up to the first NUL if there is one.
    fn send(&mut self, data: &[u8]) {
        for &byte in data.iter().take_while(|&&byte| byte != 0) {
            self.transmit(byte);
        }
    }
}

/// An initialized USART channel running 8 data bits, no parity, 1 stop bit.
///
/// The only way to get one is [Usart::init], so the line is always configured
/// before any byte moves.
#[derive(Debug)]
pub struct Usart<R: UsartRegisters> {
    registers: R,
}

impl<R: UsartRegisters> Usart<R> {
    pub fn init(registers: R, divisor: BaudDivisor) -> Self {
        registers.write(UsartRegister::BaudHigh, divisor.high());
        registers.write(UsartRegister::BaudLow, divisor.low());
        registers.write(UsartRegister::ControlB, RXEN | TXEN);

        // 8-bit characters; UPM1:0 and USBS left clear for no parity, 1 stop bit.
        registers.write(UsartRegister::ControlC, UCSZ1 | UCSZ0);

        trace!("USART initialized with divisor {}", divisor.value());
        Usart { registers }
    }

    /// Blocks until `UDRn` can take another byte.
    pub fn wait_transmit_ready(&self) {
        spin_until(|| self.registers.read(UsartRegister::StatusA) & UDRE != 0);
    }

    /// Blocks until a received byte is waiting in `UDRn`.
    pub fn wait_receive_complete(&self) {
        spin_until(|| self.registers.read(UsartRegister::StatusA) & RXC != 0);
    }
}

impl<R: UsartRegisters> SerialPort for Usart<R> {
    fn transmit(&mut self, byte: u8) {
        self.wait_transmit_ready();
        self.registers.write(UsartRegister::Data, byte);
    }

    fn receive(&mut self) -> u8 {
        self.wait_receive_complete();
        self.registers.read(UsartRegister::Data)
    }
}
