//! CMOS — RTC register access through ports 0x70/0x71

use super::{pic, without_interrupts};
use crate::sys::dev::rtc::{Cmos, RTC_IRQ};
use ::x86::io::{inb, outb};

const INDEX: u16 = 0x70;
const DATA:  u16 = 0x71;
/// Set in every index write so no NMI lands between select and access
const NMI_DISABLE: u8 = 0x80;

pub struct CmosPorts;

impl Cmos for CmosPorts {
    fn read(&self, reg: u8) -> u8 {
        without_interrupts(|| unsafe {
            outb(INDEX, NMI_DISABLE | reg);
            inb(DATA)
        })
    }

    fn modify(&self, reg: u8, f: impl FnOnce(u8) -> u8) {
        without_interrupts(|| unsafe {
            outb(INDEX, NMI_DISABLE | reg);
            let value = inb(DATA);
            outb(INDEX, NMI_DISABLE | reg);
            outb(DATA, f(value));
        })
    }

    fn set_irq(&self, enabled: bool) {
        if enabled {
            pic::unmask(RTC_IRQ);
        } else {
            pic::mask(RTC_IRQ);
        }
    }
}
