//! Register-level GPIO driver for the BCM283x/BCM2711 GPIO block,
//! mapped from `/dev/gpiomem` or `/dev/mem`.
//!
//! The block's physical address and its pull-up/down scheme depend on the [Soc]:
//! BCM2711 has per-pin `GPIO_PUP_PDN_CNTRL_REGn` fields, older chips clock a value
//! from `GPPUD` into the pins selected in `GPPUDCLKn`.

use crate::wait::spin_cycles;
use crate::{GpioBias, GpioDriver, GpioError, GpioInput, GpioOutput, GpioPin, GpioResult};
use bitvec::vec::BitVec;
use log::{debug, trace};
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::atomic::AtomicU8;

/// The function select value of a pin, as stored in `GPFSELn`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinFunction {
    Input = 0b000,
    Output = 0b001,
}

/// The Broadcom SoC whose GPIO block is being driven.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Soc {
    /// Pi 1, Zero.
    Bcm2835,
    /// Pi 2, 3, Zero 2.
    Bcm2837,
    /// Pi 4, 400, CM4.
    Bcm2711,
}

impl Soc {
    const COMPATIBLE_PATH: &'static str = "/proc/device-tree/compatible";

    /// Physical address of the GPIO block, as seen from the ARM cores.
    pub const fn gpio_base(self) -> u64 {
        match self {
            Soc::Bcm2835 => 0x20200000,
            Soc::Bcm2837 => 0x3F200000,
            Soc::Bcm2711 => 0xFE200000,
        }
    }

    pub const fn pin_count(self) -> usize {
        match self {
            Soc::Bcm2835 | Soc::Bcm2837 => 54,
            Soc::Bcm2711 => 58,
        }
    }

    /// Parses a short name such as `bcm2711`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bcm2835" | "bcm2708" => Some(Soc::Bcm2835),
            "bcm2836" | "bcm2837" | "bcm2709" | "bcm2710" => Some(Soc::Bcm2837),
            "bcm2711" => Some(Soc::Bcm2711),
            _ => None,
        }
    }

    /// Picks the SoC out of a device tree `compatible` list (NUL-separated strings).
    pub fn from_compatible(compatible: &str) -> Option<Self> {
        compatible
            .split('\0')
            .filter_map(|entry| entry.strip_prefix("brcm,"))
            .find_map(Self::from_name)
    }

    /// Reads the running board's device tree to find its SoC.
    ///
    /// # Errors
    /// - `GpioError::Io` if the device tree is not readable.
    /// - `GpioError::NotSupported` if the board is not one of the known SoCs.
    pub fn detect() -> GpioResult<Self> {
        let compatible = std::fs::read(Self::COMPATIBLE_PATH)?;
        let soc = Self::from_compatible(&String::from_utf8_lossy(&compatible))
            .ok_or(GpioError::NotSupported)?;
        debug!("Detected SoC {:?}", soc);
        Ok(soc)
    }
}

pub struct RawGpioDriver {
    mmap: MmapRaw,
    soc: Soc,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    const BLOCK_LEN: usize = 4096;

    const GPFSEL: usize = 0x00;
    const GPSET: usize = 0x1C;
    const GPCLR: usize = 0x28;
    const GPLEV: usize = 0x34;
    // BCM2835/BCM2837 pull control and clock.
    const GPPUD: usize = 0x94;
    const GPPUDCLK: usize = 0x98;
    // BCM2711 GPIO_PUP_PDN_CNTRL_REGn
    const GPPUPPDN: usize = 0xE4;

    /// Setup and hold time of the `GPPUD` control signal.
    const PULL_SETTLE_CYCLES: usize = 150;

    fn create(path: &str, soc: Soc) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        // /dev/gpiomem already starts at the GPIO block.
        let offset = if path.ends_with("gpiomem") { 0 } else { soc.gpio_base() };

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(Self::BLOCK_LEN)
            .map_raw(&file)?;

        Ok(Self::from_mmap(mmap, soc))
    }

    /// Drives the GPIO block of `soc` through an already mapped register page.
    pub fn from_mmap(mmap: MmapRaw, soc: Soc) -> Self {
        RawGpioDriver {
            mmap,
            soc,
            used_pins: BitVec::repeat(false, soc.pin_count()),
        }
    }

    pub fn new_gpiomem(soc: Soc) -> GpioResult<Self> {
        Self::create("/dev/gpiomem", soc)
    }

    pub fn new_mem(soc: Soc) -> GpioResult<Self> {
        Self::create("/dev/mem", soc)
    }

    pub fn soc(&self) -> Soc {
        self.soc
    }

    fn check_pin(&self, pin_index: usize) -> GpioResult<()> {
        if pin_index >= self.soc.pin_count() {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    /// Pointer to the 32-bit register at `offset` bytes plus `index` words.
    fn register(&self, offset: usize, index: usize) -> *mut u32 {
        let base = self.mmap.as_mut_ptr() as *mut u32;
        unsafe { base.add(offset / 4 + index) }
    }

    pub fn raw_set_pin_function(&self, pin_index: usize, function: PinFunction) -> GpioResult<()> {
        self.check_pin(pin_index)?;

        let register_ptr = self.register(Self::GPFSEL, pin_index / 10);
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift);
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        trace!("Set pin function: pin_index={} function={:?}", pin_index, function);
        Ok(())
    }

    pub(crate) fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        self.check_pin(pin_index)?;

        let offset = if high { Self::GPSET } else { Self::GPCLR };
        let register_ptr = self.register(offset, pin_index / 32);
        unsafe { register_ptr.write_volatile(1 << (pin_index % 32)) };

        Ok(())
    }

    pub(crate) fn raw_get_pin_level(&self, pin_index: usize) -> GpioResult<bool> {
        self.check_pin(pin_index)?;

        let register_ptr = self.register(Self::GPLEV, pin_index / 32);
        let register_value = unsafe { register_ptr.read_volatile() };
        Ok((register_value >> (pin_index % 32)) & 1 != 0)
    }

    pub(crate) fn raw_set_bias(&self, pin_index: usize, bias: GpioBias) -> GpioResult<()> {
        self.check_pin(pin_index)?;

        match self.soc {
            Soc::Bcm2711 => self.raw_set_bias_field(pin_index, bias),
            Soc::Bcm2835 | Soc::Bcm2837 => self.raw_clock_bias(pin_index, bias),
        }

        trace!("Set pin bias: pin_index={} bias={:?}", pin_index, bias);
        Ok(())
    }

    fn raw_set_bias_field(&self, pin_index: usize, bias: GpioBias) {
        let bias_value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };

        let register_ptr = self.register(Self::GPPUPPDN, pin_index / 16);
        let shift = (pin_index % 16) * 2;
        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b11 << shift);
        register_value |= bias_value << shift;
        unsafe { register_ptr.write_volatile(register_value) };
    }

    /// Value of `GPPUD` that requests `bias` on the older chips.
    pub(crate) fn pud_value(bias: GpioBias) -> u32 {
        match bias {
            GpioBias::None => 0b00,
            GpioBias::PullDown => 0b01,
            GpioBias::PullUp => 0b10,
        }
    }

    fn raw_clock_bias(&self, pin_index: usize, bias: GpioBias) {
        let control_ptr = self.register(Self::GPPUD, 0);
        let clock_ptr = self.register(Self::GPPUDCLK, pin_index / 32);

        unsafe { control_ptr.write_volatile(Self::pud_value(bias)) };
        spin_cycles(Self::PULL_SETTLE_CYCLES);
        unsafe { clock_ptr.write_volatile(1 << (pin_index % 32)) };
        spin_cycles(Self::PULL_SETTLE_CYCLES);
        unsafe {
            control_ptr.write_volatile(0);
            clock_ptr.write_volatile(0);
        }
    }

    /// Puts the pin back into its power-on state: input, no bias.
    pub(crate) fn raw_reset(&self, pin_index: usize) -> GpioResult<()> {
        self.raw_set_pin_function(pin_index, PinFunction::Input)?;
        self.raw_set_bias(pin_index, GpioBias::None)?;
        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?}, {:?})", self.soc, self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.soc.pin_count())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);
        self.raw_reset(index)?;

        Ok(Box::new(RawGpioPin {
            driver: self,
            pin_index: index,
        }))
    }
}

struct RawGpioPin<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
}

impl Debug for RawGpioPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for RawGpioPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        self.driver.raw_set_pin_function(self.pin_index, PinFunction::Input)?;
        Ok(Box::new(RawGpioInput { pin: self }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        // Latch the idle (high) level before switching to output so the line never glitches low.
        self.driver.raw_set_pin_output(self.pin_index, true)?;
        self.driver.raw_set_pin_function(self.pin_index, PinFunction::Output)?;
        Ok(Box::new(RawGpioOutput { pin: self }))
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.driver.raw_set_bias(self.pin_index, bias)
    }
}

impl Drop for RawGpioPin<'_> {
    fn drop(&mut self) {
        _ = self.driver.raw_reset(self.pin_index);
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

struct RawGpioInput<'a> {
    pin: &'a RawGpioPin<'a>,
}

impl Debug for RawGpioInput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.pin)
    }
}

impl GpioInput for RawGpioInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        self.pin.driver.raw_get_pin_level(self.pin.pin_index)
    }
}

struct RawGpioOutput<'a> {
    pin: &'a RawGpioPin<'a>,
}

impl Debug for RawGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for RawGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.pin.driver.raw_set_pin_output(self.pin.pin_index, value)
    }
}
