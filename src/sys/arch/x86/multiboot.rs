//! Multiboot (v1) — header for the loader and the boot information it
//! leaves behind
//!
//! The information block lives in low memory, which is unmapped once
//! paging is on, so `BootInfo::read` copies what the kernel needs first.

use crate::sys::config::MAX_PROCESSES;
use crate::sys::mem::{KERNEL_BASE, KERNEL_MEM_END, KERNEL_STACK_SIZE};
use bit_field::BitField;

pub const HEADER_MAGIC: u32 = 0x1BAD_B002;
/// Value in eax when a multiboot loader hands over
pub const LOADER_MAGIC: u32 = 0x2BAD_B002;

/// Page-align modules, provide memory information
const HEADER_FLAGS: u32 = 0b11;

#[used]
#[link_section = ".multiboot"]
static HEADER: [u32; 3] = [
    HEADER_MAGIC,
    HEADER_FLAGS,
    0u32.wrapping_sub(HEADER_MAGIC.wrapping_add(HEADER_FLAGS)),
];

const INFO_CMDLINE: usize = 2;
const INFO_MODS:    usize = 3;

const CMDLINE_MAX: usize = 256;

#[repr(C)]
struct RawInfo {
    flags:       u32,
    mem_lower:   u32,
    mem_upper:   u32,
    boot_device: u32,
    cmdline:     u32,
    mods_count:  u32,
    mods_addr:   u32,
}

#[repr(C)]
struct RawModule {
    start:    u32,
    end:      u32,
    string:   u32,
    reserved: u32,
}

pub struct BootInfo {
    cmdline:     [u8; CMDLINE_MAX],
    cmdline_len: usize,
    /// First module: the filesystem image
    module:      Option<(u32, u32)>,
}

impl BootInfo {
    /// # Safety
    /// `info` must be the address the loader passed in ebx, read before
    /// paging is enabled.
    pub unsafe fn read(info: u32) -> Self {
        let raw = &*(info as *const RawInfo);
        let mut boot = Self { cmdline: [0; CMDLINE_MAX], cmdline_len: 0, module: None };

        if raw.flags.get_bit(INFO_CMDLINE) && raw.cmdline != 0 {
            let mut ptr = raw.cmdline as *const u8;
            while boot.cmdline_len < CMDLINE_MAX && *ptr != 0 {
                boot.cmdline[boot.cmdline_len] = *ptr;
                boot.cmdline_len += 1;
                ptr = ptr.add(1);
            }
        }

        if raw.flags.get_bit(INFO_MODS) && raw.mods_count > 0 {
            let module = &*(raw.mods_addr as *const RawModule);
            boot.module = Some((module.start, module.end));
        }
        boot
    }

    /// Command line without the kernel path in front
    pub fn options(&self) -> &str {
        let line = core::str::from_utf8(&self.cmdline[..self.cmdline_len]).unwrap_or("");
        match line.split_once(' ') {
            Some((_, rest)) => rest,
            None if line.contains('=') => line,
            None => "",
        }
    }

    /// The filesystem module, if it sits inside the kernel page (below the
    /// slot stacks) where it stays reachable after paging is on
    pub fn module(&self) -> Option<&'static [u8]> {
        let (start, end) = self.module?;
        let limit = KERNEL_MEM_END - MAX_PROCESSES as u32 * KERNEL_STACK_SIZE;
        if start < KERNEL_BASE || end > limit || end <= start {
            kerror!("boot: module at {:#x}..{:#x} is outside the kernel page", start, end);
            return None;
        }
        Some(unsafe { core::slice::from_raw_parts(start as *const u8, (end - start) as usize) })
    }
}
