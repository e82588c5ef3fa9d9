//! PIT — channel 0 in one-shot mode
//!
//! Mode 0 fires once per load, so the tick handler reloads the count
//! (`rearm`) before acknowledging the interrupt.

use ::x86::io::outb;
use core::sync::atomic::{AtomicU16, Ordering};

const CHANNEL0: u16 = 0x40;
const COMMAND:  u16 = 0x43;
/// Channel 0, lobyte/hibyte, mode 0, binary
const ONE_SHOT: u8 = 0x30;

static DIVISOR: AtomicU16 = AtomicU16::new(0);

pub fn init(divisor: u16) {
    DIVISOR.store(divisor, Ordering::Relaxed);
    rearm();
}

pub fn rearm() {
    let [lo, hi] = DIVISOR.load(Ordering::Relaxed).to_le_bytes();
    unsafe {
        outb(COMMAND, ONE_SHOT);
        outb(CHANNEL0, lo);
        outb(CHANNEL0, hi);
    }
}
