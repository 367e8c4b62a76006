//! Blocking busy-waits.
//!
//! Every wait here is unbounded: a peripheral that never becomes ready hangs the caller.

use crate::GpioResult;
use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Spins until `ready` returns `true`.
pub fn spin_until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        spin_loop();
    }
}

/// Spins until `ready` returns `Ok(true)`, bailing out on the first error.
pub fn try_spin_until(mut ready: impl FnMut() -> GpioResult<bool>) -> GpioResult<()> {
    while !ready()? {
        spin_loop();
    }
    Ok(())
}

/// Spins for roughly `cycles` iterations.
pub fn spin_cycles(cycles: usize) {
    for _ in 0..cycles {
        spin_loop();
    }
}

/// Blocks the caller for `duration`. A zero duration returns immediately.
pub fn delay(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
