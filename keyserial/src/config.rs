use std::str::FromStr;
use std::time::Duration;
use eyre::eyre;
use thiserror::Error;
use keyserial_hal::GpioResult;
use keyserial_hal::keypad::{KEYPAD_COLS, KEYPAD_ROWS};
use keyserial_hal::raw::Soc;
use keyserial_hal::usart::BaudDivisor;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("unknown GPIO backend {0:?}, expected gpiomem, mem or gpiod")]
    UnknownBackend(String),
    #[error("unknown SoC {0:?}, expected bcm2835, bcm2837 or bcm2711")]
    UnknownSoc(String),
    #[error("expected {expected} pin numbers, got {got}")]
    PinCount { expected: usize, got: usize },
    #[error("pin {0} is not a valid GPIO line offset")]
    PinOutOfRange(usize),
}

/// Where the keypad lines are driven from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBackend {
    /// GPIO registers through `/dev/gpiomem`.
    #[default] GpioMem,
    /// GPIO registers through `/dev/mem`.
    Mem,
    /// The GPIO character device.
    Gpiod,
}

impl FromStr for GpioBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpiomem" => Ok(GpioBackend::GpioMem),
            "mem" => Ok(GpioBackend::Mem),
            "gpiod" => Ok(GpioBackend::Gpiod),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub clock_hz: u32,
    pub baud: u32,
    pub debounce: Duration,
    pub row_pins: [usize; KEYPAD_ROWS],
    pub col_pins: [usize; KEYPAD_COLS],
    pub gpio_backend: GpioBackend,
    /// `None` means the SoC is read from the device tree at startup.
    pub gpio_soc: Option<Soc>,
    pub gpio_chip: String,
    pub usart_device: String,
    pub usart_base: u64,
}

pub fn parse_pin_bus<const N: usize>(pin_str: &str) -> eyre::Result<[usize; N]> {
    let pins = pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<usize>, _>>()?;
    let got = pins.len();
    Ok(pins
        .try_into()
        .map_err(|_| ConfigError::PinCount { expected: N, got })?)
}

/// Converts pin numbers to GPIO character device line offsets.
pub fn line_offsets<const N: usize>(pins: [usize; N]) -> Result<[u32; N], ConfigError> {
    let mut offsets = [0; N];
    for (offset, pin) in offsets.iter_mut().zip(pins) {
        *offset = u32::try_from(pin).map_err(|_| ConfigError::PinOutOfRange(pin))?;
    }
    Ok(offsets)
}

pub fn parse_soc(soc: &str) -> Result<Soc, ConfigError> {
    Soc::from_name(soc).ok_or_else(|| ConfigError::UnknownSoc(soc.to_string()))
}

pub fn parse_address(address: &str) -> eyre::Result<u64> {
    let address = address.trim();
    let value = match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => address.parse()?,
    };
    Ok(value)
}

impl Config {
    pub const CLOCK_HZ: u32 = 16_000_000;
    pub const BAUD: u32 = 9600;
    pub const DEBOUNCE: Duration = Duration::from_millis(300);

    /// Loads the wiring from the environment (and `.env`, if present).
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let required = |key: &str| lookup(key).ok_or_else(|| eyre!("{} is not set", key));

        let row_pins = parse_pin_bus(&required("KEYSERIAL_KEYPAD_PINS_ROWS")?)?;
        let col_pins = parse_pin_bus(&required("KEYSERIAL_KEYPAD_PINS_COLS")?)?;
        let usart_base = parse_address(&required("KEYSERIAL_USART_BASE")?)?;

        let gpio_backend = match lookup("KEYSERIAL_GPIO_BACKEND") {
            Some(backend) => backend.parse()?,
            None => GpioBackend::default(),
        };
        let gpio_soc = lookup("KEYSERIAL_GPIO_SOC").map(|soc| parse_soc(&soc)).transpose()?;

        Ok(Config {
            clock_hz: Self::CLOCK_HZ,
            baud: Self::BAUD,
            debounce: Self::DEBOUNCE,
            row_pins,
            col_pins,
            gpio_backend,
            gpio_soc,
            gpio_chip: lookup("KEYSERIAL_GPIO_CHIP").unwrap_or_else(|| "/dev/gpiochip0".to_string()),
            usart_device: lookup("KEYSERIAL_USART_DEVICE").unwrap_or_else(|| "/dev/mem".to_string()),
            usart_base,
        })
    }

    pub fn baud_divisor(&self) -> GpioResult<BaudDivisor> {
        BaudDivisor::compute(self.clock_hz, self.baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    const WIRING: [(&str, &str); 3] = [
        ("KEYSERIAL_KEYPAD_PINS_ROWS", "4, 5, 6, 7"),
        ("KEYSERIAL_KEYPAD_PINS_COLS", "8;9;10;11"),
        ("KEYSERIAL_USART_BASE", "0x20000000"),
    ];

    #[test]
    fn parses_pin_lists_with_any_separator() {
        assert_eq!(parse_pin_bus::<4>("1,2 3;4").unwrap(), [1, 2, 3, 4]);
        assert_eq!(parse_pin_bus::<4>(" 17 , 27 , 22 , 5 ").unwrap(), [17, 27, 22, 5]);
    }

    #[test]
    fn rejects_wrong_pin_count() {
        let err = parse_pin_bus::<4>("1,2,3").unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::PinCount { expected: 4, got: 3 }),
        );
    }

    #[test]
    fn parses_hex_and_decimal_addresses() {
        assert_eq!(parse_address("0x3F201000").unwrap(), 0x3F201000);
        assert_eq!(parse_address("4096").unwrap(), 4096);
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn fills_defaults() {
        let config = Config::from_lookup(lookup(&WIRING)).unwrap();

        assert_eq!(config.row_pins, [4, 5, 6, 7]);
        assert_eq!(config.col_pins, [8, 9, 10, 11]);
        assert_eq!(config.usart_base, 0x20000000);
        assert_eq!(config.gpio_backend, GpioBackend::GpioMem);
        assert_eq!(config.gpio_soc, None);
        assert_eq!(config.gpio_chip, "/dev/gpiochip0");
        assert_eq!(config.usart_device, "/dev/mem");
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.baud_divisor().unwrap().value(), 103);
    }

    #[test]
    fn selects_backend() {
        let mut vars = WIRING.to_vec();
        vars.push(("KEYSERIAL_GPIO_BACKEND", "GPIOD"));

        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.gpio_backend, GpioBackend::Gpiod);
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut vars = WIRING.to_vec();
        vars.push(("KEYSERIAL_GPIO_BACKEND", "sysfs"));

        let err = Config::from_lookup(lookup(&vars)).unwrap_err();

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownBackend("sysfs".to_string())),
        );
    }

    #[test]
    fn selects_soc() {
        let mut vars = WIRING.to_vec();
        vars.push(("KEYSERIAL_GPIO_SOC", "bcm2837"));

        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.gpio_soc, Some(Soc::Bcm2837));
    }

    #[test]
    fn rejects_unknown_soc() {
        let mut vars = WIRING.to_vec();
        vars.push(("KEYSERIAL_GPIO_SOC", "bcm2712"));

        let err = Config::from_lookup(lookup(&vars)).unwrap_err();

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownSoc("bcm2712".to_string())),
        );
    }

    #[test]
    fn converts_pins_to_line_offsets() {
        assert_eq!(line_offsets([17, 27, 22, 5]), Ok([17, 27, 22, 5]));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn rejects_pins_past_line_offset_range() {
        let too_big = u32::MAX as usize + 1;

        assert_eq!(
            line_offsets([4, too_big, 6, 7]),
            Err(ConfigError::PinOutOfRange(too_big)),
        );
    }

    #[test]
    fn requires_keypad_pins() {
        let err = Config::from_lookup(lookup(&WIRING[1..])).unwrap_err();

        assert!(err.to_string().contains("KEYSERIAL_KEYPAD_PINS_ROWS"));
    }
}
