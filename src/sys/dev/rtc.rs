//! RTC — the "rtc" device
//!
//! Opening the device turns on periodic interrupts, `read` blocks until
//! the next one and `write` takes a 4-byte little-endian rate in Hz. The
//! clock is shared: the last rate written wins.

use super::Device;
use crate::sys::error::Error;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub const RTC_IRQ: u8 = 8;

pub const REG_A: u8 = 0x0A;
pub const REG_B: u8 = 0x0B;
pub const REG_C: u8 = 0x0C;

/// Periodic interrupt enable in register B
const PERIODIC: u8 = 1 << 6;
/// Base of the divider chain
const BASE_HZ: u32 = 32768;
pub const MAX_RATE: u32 = 1024;

/// Register access to the clock chip
pub trait Cmos: Sync {
    fn read(&self, reg: u8) -> u8;

    /// Read-modify-write that the clock interrupt cannot split
    fn modify(&self, reg: u8, f: impl FnOnce(u8) -> u8);

    /// Pass the clock line through the interrupt controller or not
    fn set_irq(&self, enabled: bool);
}

/// Register A rate-select value for `hz`, a power of two in 2..=1024
pub fn rate_select(hz: u32) -> Result<u8, Error> {
    if !(2..=MAX_RATE).contains(&hz) || !hz.is_power_of_two() {
        return Err(Error::BadRate);
    }
    Ok((BASE_HZ / hz).trailing_zeros() as u8 + 1)
}

pub struct Rtc<H: Cmos> {
    hw:    H,
    ticks: AtomicU32,
    users: AtomicUsize,
}

impl<H: Cmos> Rtc<H> {
    pub const fn new(hw: H) -> Self {
        Self {
            hw,
            ticks: AtomicU32::new(0),
            users: AtomicUsize::new(0),
        }
    }

    /// IRQ 8 handler. Register C must be read or the chip stays quiet.
    pub fn on_interrupt(&self) {
        self.hw.read(REG_C);
        self.ticks.fetch_add(1, Ordering::Release);
    }

    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl<H: Cmos> Device for Rtc<H> {
    fn open(&self) -> Result<(), Error> {
        if self.users.fetch_add(1, Ordering::AcqRel) == 0 {
            self.hw.modify(REG_B, |b| b | PERIODIC);
            self.hw.set_irq(true);
        }
        Ok(())
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize, Error> {
        let start = self.ticks();
        while self.ticks() == start {
            core::hint::spin_loop();
        }
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, Error> {
        let bytes: [u8; 4] = buf.try_into().map_err(|_| Error::BadRate)?;
        let select = rate_select(u32::from_le_bytes(bytes))?;
        self.hw.modify(REG_A, |a| (a & 0xF0) | select);
        Ok(0)
    }

    fn close(&self) -> Result<(), Error> {
        let last = self
            .users
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| Error::BadDescriptor)?
            == 1;
        if last {
            self.hw.set_irq(false);
            self.hw.modify(REG_B, |b| b & !PERIODIC);
        }
        Ok(())
    }
}
