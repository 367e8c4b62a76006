mod app;
mod config;

use dotenv::dotenv;
use log::{debug, info, warn};
use sysinfo::System;
use keyserial_hal::GpioDriver;
use keyserial_hal::gpiod::GpiodKeypadMatrix;
use keyserial_hal::keypad::{Keypad, KeypadMatrix, KeypadPins, KeypadScanner};
use keyserial_hal::raw::{RawGpioDriver, Soc};
use keyserial_hal::usart::{RawUsartRegisters, SerialPort, Usart};
use crate::app::App;
use crate::config::{Config, GpioBackend, line_offsets};

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!("KeySerial v.{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Running on {} ({}), kernel {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    let config = Config::from_env()?;
    info!("Keypad @ Rows: {:?}, Cols: {:?} via {:?}",
        config.row_pins, config.col_pins, config.gpio_backend);
    info!("USART @ {} {:#x}", config.usart_device, config.usart_base);

    debug!("Initializing USART...");
    let divisor = config.baud_divisor()?;
    let registers = RawUsartRegisters::open(&config.usart_device, config.usart_base)?;
    let usart = Usart::init(registers, divisor);
    info!("{:?} initialized: {} baud requested, {} baud effective (divisor {}), 8-N-1.",
        usart, config.baud, divisor.effective_baud(config.clock_hz), divisor.value());

    match config.gpio_backend {
        GpioBackend::GpioMem | GpioBackend::Mem => {
            debug!("Initializing GPIO driver...");
            let soc = match config.gpio_soc {
                Some(soc) => soc,
                None => Soc::detect()?,
            };
            let gpio = if config.gpio_backend == GpioBackend::GpioMem {
                RawGpioDriver::new_gpiomem(soc)?
            } else {
                RawGpioDriver::new_mem(soc)?
            };
            debug!("{:?} initialized ({} pins).", gpio, gpio.count()?);

            let mut pins = KeypadPins::claim(&gpio, config.row_pins, config.col_pins)?;
            let matrix = pins.matrix()?;
            run(&config, matrix, usart)
        }
        GpioBackend::Gpiod => {
            let matrix = GpiodKeypadMatrix::open(
                &config.gpio_chip,
                line_offsets(config.row_pins)?,
                line_offsets(config.col_pins)?,
            )?;
            run(&config, matrix, usart)
        }
    }
}

fn run<M: KeypadMatrix, S: SerialPort>(config: &Config, matrix: M, serial: S) -> eyre::Result<()> {
    debug!("Initializing keypad...");
    let scanner = KeypadScanner::new(matrix).with_debounce(config.debounce);
    scanner.init()?;
    debug!("{:?} initialized.", scanner);

    let held = scanner.read()?;
    if !held.is_empty() {
        warn!("Keys held down at startup: {:?}. Each will be sent once it is scanned.", held);
    }

    let mut app = App::new(scanner, serial);

    info!("Starting main loop...");
    loop {
        app.update()?;
    }
}
