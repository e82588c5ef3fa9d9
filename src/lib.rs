//! termkern — a small 32-bit x86 kernel that runs one shell chain per
//! terminal and rotates between terminals on the timer.
//!
//! The library holds everything that is not tied to the boot path; the
//! `termkern` binary (feature `kernel-image`) wires it to the hardware.

#![cfg_attr(not(test), no_std)]

/// Info-level kernel log record
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {
        $crate::sys::debug::log($crate::sys::debug::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::sys::debug::log($crate::sys::debug::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::sys::debug::log($crate::sys::debug::Level::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::sys::debug::log($crate::sys::debug::Level::Debug, format_args!($($arg)*))
    };
}

pub mod sys;

#[cfg(test)]
pub mod testing;

pub use sys::kernel::Kernel;
