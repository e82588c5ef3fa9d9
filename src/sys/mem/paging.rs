//! Paging — 32-bit two-level page tables
//!
//! One `PageTable` type serves both levels. At directory level an entry
//! points either at a table or, with `LARGE`, straight at a 4 MB frame.

use super::TABLE_SIZE;
use bit_field::BitField;
use core::fmt;

/// Entry flag bits (low 12 bits of an entry)
pub mod flags {
    pub const PRESENT:  u32 = 1 << 0;
    pub const WRITABLE: u32 = 1 << 1;
    pub const USER:     u32 = 1 << 2;
    pub const LARGE:    u32 = 1 << 7;

    pub const MASK: u32 = 0xFFF;
}

pub const fn directory_index(vaddr: u32) -> usize {
    (vaddr >> 22) as usize
}

pub const fn table_index(vaddr: u32) -> usize {
    ((vaddr >> 12) & 0x3FF) as usize
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct PageEntry(u32);

impl PageEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build an entry; the address is cut to the 4 KB or 4 MB boundary
    /// that `flags` implies.
    pub fn new(phys: u32, flags: u32) -> Self {
        let mut raw = flags & flags::MASK;
        if flags & flags::LARGE != 0 {
            raw.set_bits(22..32, phys.get_bits(22..32));
        } else {
            raw.set_bits(12..32, phys.get_bits(12..32));
        }
        Self(raw)
    }

    pub fn is_present(self) -> bool {
        self.0.get_bit(0)
    }

    pub fn is_writable(self) -> bool {
        self.0.get_bit(1)
    }

    pub fn is_user(self) -> bool {
        self.0.get_bit(2)
    }

    pub fn is_large(self) -> bool {
        self.0.get_bit(7)
    }

    pub fn address(self) -> u32 {
        if self.is_large() {
            self.0 & 0xFFC0_0000
        } else {
            self.0 & 0xFFFF_F000
        }
    }

    pub fn flags(self) -> u32 {
        self.0.get_bits(0..12)
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.0 |= flags & flags::MASK;
    }

    pub fn clear_flags(&mut self, flags: u32) {
        self.0 &= !(flags & flags::MASK);
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageEntry({:#010x}, flags={:#05x})", self.address(), self.flags())
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageEntry; TABLE_SIZE],
}

impl PageTable {
    pub const fn new() -> Self {
        Self { entries: [PageEntry::empty(); TABLE_SIZE] }
    }

    pub fn clear(&mut self) {
        self.entries = [PageEntry::empty(); TABLE_SIZE];
    }

    pub fn entry(&self, index: usize) -> PageEntry {
        self.entries[index]
    }

    // -- directory level ---------------------------------------------------

    pub fn set_entry(&mut self, vaddr: u32, paddr: u32, flags: u32) {
        self.entries[directory_index(vaddr)] = PageEntry::new(paddr, flags);
    }

    pub fn set_flags(&mut self, vaddr: u32, flags: u32) {
        self.entries[directory_index(vaddr)].set_flags(flags);
    }

    pub fn clear_flags(&mut self, vaddr: u32, flags: u32) {
        self.entries[directory_index(vaddr)].clear_flags(flags);
    }

    pub fn directory_entry(&self, vaddr: u32) -> PageEntry {
        self.entries[directory_index(vaddr)]
    }

    // -- table level -------------------------------------------------------

    pub fn map_page(&mut self, vaddr: u32, paddr: u32, flags: u32) {
        self.entries[table_index(vaddr)] = PageEntry::new(paddr, flags & !flags::LARGE);
    }

    pub fn page_entry(&self, vaddr: u32) -> PageEntry {
        self.entries[table_index(vaddr)]
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}
