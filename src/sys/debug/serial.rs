//! Serial — COM1 log sink (16550 UART)

use core::fmt::{self, Write};
use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;

const COM1: u16 = 0x3F8;

lazy_static! {
    static ref SERIAL: Mutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(COM1) };
        port.init();
        Mutex::new(port)
    };
}

pub fn init() {
    lazy_static::initialize(&SERIAL);
}

pub fn print_fmt(args: fmt::Arguments) {
    // A tick landing while COM1 is held would deadlock on the next log line.
    crate::sys::arch::x86::without_interrupts(|| {
        let _ = SERIAL.lock().write_fmt(args);
    });
}
