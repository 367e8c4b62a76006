//! The control loop: scan the keypad, send every pressed key over the serial line.

use log::debug;
use keyserial_hal::GpioResult;
use keyserial_hal::keypad::{KeypadMatrix, KeypadScanner};
use keyserial_hal::usart::SerialPort;

/// The main app state struct.
#[derive(Debug)]
pub struct App<M: KeypadMatrix, S: SerialPort> {
    scanner: KeypadScanner<M>,
    serial: S,
    /// Keys sent since startup.
    sent: u64,
}

impl<M: KeypadMatrix, S: SerialPort> App<M, S> {
    /// Creates the app from an initialized scanner and serial line.
    pub fn new(scanner: KeypadScanner<M>, serial: S) -> Self {
        App {
            scanner,
            serial,
            sent: 0,
        }
    }

    /// Runs one scan pass, transmitting each key as soon as it is detected.
    ///
    /// Blocks while a key is held. Returns how many keys were sent.
    pub fn update(&mut self) -> GpioResult<usize> {
        let serial = &mut self.serial;
        let sent = self.scanner.scan_pass(|key| {
            serial.transmit(key.to_byte());
            Ok(())
        })?;

        if sent > 0 {
            self.sent += sent as u64;
            debug!("Sent {} key(s), {} total", sent, self.sent);
        }

        Ok(sent)
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}
