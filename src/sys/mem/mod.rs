//! mem — physical layout and address spaces
//!
//!   paging — page entries and tables
//!   space  — per-slot page directories
//!
//! User pointers are only accepted inside the 4 MB program window. The
//! video alias `PROG_VIDMEM_ADDR` (0x08400000) sits just past that window
//! on purpose: `vidmap` hands out its address, but no syscall buffer can
//! point into it.

pub mod paging;
pub mod space;

use crate::sys::proc::Pid;

pub const TABLE_SIZE:      usize = 1024;
pub const PAGE_SIZE:       u32   = 0x1000;
pub const LARGE_PAGE_SIZE: u32   = 0x40_0000;

/// VGA text page as seen by the kernel
pub const VIDEO: u32 = 0xB8000;

/// The kernel image lives in the second 4 MB
pub const KERNEL_BASE: u32 = 0x40_0000;

/// Slot stacks grow down from here
pub const KERNEL_MEM_END:    u32 = 0x80_0000;
pub const KERNEL_STACK_SIZE: u32 = 0x2000;

/// Physical 4 MB frames handed to processes start above the kernel
pub const PROCESS_FRAME_BASE: u32 = 0x80_0000;

pub const PROGRAM_WINDOW:     u32 = 0x0800_0000;
pub const PROGRAM_WINDOW_END: u32 = PROGRAM_WINDOW + LARGE_PAGE_SIZE;
pub const PROGRAM_IMAGE:      u32 = 0x0804_8000;
pub const USER_STACK_TOP:     u32 = PROGRAM_WINDOW_END - 4;
pub const USER_STACK_RESERVE: u32 = 0x4000;

/// Largest image that still leaves room for the user stack
pub const PROGRAM_CAPACITY: u32 = PROGRAM_WINDOW_END - USER_STACK_RESERVE - PROGRAM_IMAGE;

/// User alias of the terminal's video page, the 4 KB right above the window
pub const PROG_VIDMEM_ADDR: u32 = PROGRAM_WINDOW_END;

/// Off-screen copy of `terminal`'s text page, right above `VIDEO`
pub const fn backing_frame(terminal: usize) -> u32 {
    VIDEO + (terminal as u32 + 1) * PAGE_SIZE
}

pub const fn program_frame(pid: Pid) -> u32 {
    PROCESS_FRAME_BASE + pid.index() as u32 * LARGE_PAGE_SIZE
}

pub const fn kernel_stack_top(pid: Pid) -> u32 {
    KERNEL_MEM_END - pid.index() as u32 * KERNEL_STACK_SIZE - 4
}

/// A user virtual address and the physical address it currently maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub virt: u32,
    pub phys: u32,
}

/// True if `[addr, addr + len)` lies inside the program window
pub fn in_program_window(addr: u32, len: usize) -> bool {
    let Ok(len) = u32::try_from(len) else {
        return false;
    };
    match addr.checked_add(len) {
        Some(end) => addr >= PROGRAM_WINDOW && end <= PROGRAM_WINDOW_END,
        None => false,
    }
}
