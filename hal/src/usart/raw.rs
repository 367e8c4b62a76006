use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use log::debug;
use memmap2::{MmapOptions, MmapRaw};
use crate::{GpioError, GpioResult};
use crate::usart::{UsartRegister, UsartRegisters};

/// A USART register block reached through a memory-mapped device file.
///
/// `base` is the physical address of the data space the register offsets are relative to,
/// so `UCSRnA` lives at `base + 0xC0`.
pub struct RawUsartRegisters {
    mmap: MmapRaw,
    window: usize,
}

impl RawUsartRegisters {
    const PAGE_SIZE: u64 = 4096;

    pub fn open(path: &str, base: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let page = base & !(Self::PAGE_SIZE - 1);
        let window = (base - page) as usize;
        let len = (window + UsartRegister::WINDOW_LEN).div_ceil(Self::PAGE_SIZE as usize)
            * Self::PAGE_SIZE as usize;

        let mmap = MmapOptions::new()
            .offset(page)
            .len(len)
            .map_raw(&file)
            .map_err(|e| GpioError::Other(format!("cannot map {path} at {page:#x}: {e}")))?;

        debug!("Mapped USART registers from {} at {:#x} (+{:#x})", path, page, window);
        Ok(RawUsartRegisters { mmap, window })
    }

    fn address(&self, register: UsartRegister) -> *mut u8 {
        unsafe { self.mmap.as_mut_ptr().add(self.window + register.offset()) }
    }
}

impl Debug for RawUsartRegisters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawUsartRegisters({:?})", self.address(UsartRegister::StatusA).addr())
    }
}

impl UsartRegisters for RawUsartRegisters {
    fn read(&self, register: UsartRegister) -> u8 {
        unsafe { self.address(register).read_volatile() }
    }

    fn write(&self, register: UsartRegister, value: u8) {
        unsafe { self.address(register).write_volatile(value) }
    }
}
