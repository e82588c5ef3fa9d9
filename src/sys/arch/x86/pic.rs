//! PIC — the chained 8259 pair, remapped above the exception vectors

use bit_field::BitField;
use ::x86::io::{inb, outb};

pub const MASTER_OFFSET: u8 = 0x20;
pub const SLAVE_OFFSET:  u8 = MASTER_OFFSET + 8;

const MASTER_COMMAND: u16 = 0x20;
const MASTER_DATA:    u16 = 0x21;
const SLAVE_COMMAND:  u16 = 0xA0;
const SLAVE_DATA:     u16 = 0xA1;

/// Unused port; a write to it gives slow controllers time to settle
const WAIT_PORT:      u16 = 0x80;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const EOI:       u8 = 0x20;
/// Slave sits on master IRQ 2
const CASCADE:   u8 = 2;

unsafe fn io_wait() {
    outb(WAIT_PORT, 0);
}

/// Remap both controllers with every line masked except the cascade
pub fn init() {
    unsafe {
        outb(MASTER_COMMAND, ICW1_INIT);
        io_wait();
        outb(SLAVE_COMMAND, ICW1_INIT);
        io_wait();
        outb(MASTER_DATA, MASTER_OFFSET);
        io_wait();
        outb(SLAVE_DATA, SLAVE_OFFSET);
        io_wait();
        outb(MASTER_DATA, 1 << CASCADE);
        io_wait();
        outb(SLAVE_DATA, CASCADE);
        io_wait();
        outb(MASTER_DATA, ICW4_8086);
        io_wait();
        outb(SLAVE_DATA, ICW4_8086);
        io_wait();

        outb(MASTER_DATA, !(1 << CASCADE));
        outb(SLAVE_DATA, 0xFF);
    }
}

pub fn vector(irq: u8) -> u8 {
    MASTER_OFFSET + irq
}

fn data_port(irq: u8) -> (u16, usize) {
    if irq < 8 {
        (MASTER_DATA, irq as usize)
    } else {
        (SLAVE_DATA, irq as usize - 8)
    }
}

fn set_masked(irq: u8, masked: bool) {
    let (port, line) = data_port(irq);
    unsafe {
        let mut mask = inb(port);
        mask.set_bit(line, masked);
        outb(port, mask);
    }
}

pub fn unmask(irq: u8) {
    set_masked(irq, false);
}

pub fn mask(irq: u8) {
    set_masked(irq, true);
}

pub fn end_of_interrupt(irq: u8) {
    unsafe {
        if irq >= 8 {
            outb(SLAVE_COMMAND, EOI);
        }
        outb(MASTER_COMMAND, EOI);
    }
}
