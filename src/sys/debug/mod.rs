//! debug — kernel log records
//!
//! `klog!`/`kwarn!`/`kerror!`/`kdebug!` end up here. Records below the
//! global level are dropped; the rest go to COM1 on hardware.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod serial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Info  = 1,
    Warn  = 2,
    Error = 3,
}

impl Level {
    pub fn parse(name: &str) -> Option<Level> {
        match name {
            "debug" => Some(Level::Debug),
            "info"  => Some(Level::Info),
            "warn"  => Some(Level::Warn),
            "error" => Some(Level::Error),
            _       => None,
        }
    }

    const fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            _ => Level::Error,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info  => "info",
            Level::Warn  => "warn",
            Level::Error => "error",
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

pub fn set_level(level: Level) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> Level {
    Level::from_u8(LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: Level) -> bool {
    level >= self::level()
}

pub fn log(level: Level, args: fmt::Arguments) {
    if enabled(level) {
        sink(level, args);
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
fn sink(level: Level, args: fmt::Arguments) {
    serial::print_fmt(format_args!("[{:>5}] {}\n", level.label(), args));
}

// Host builds have no console.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn sink(_level: Level, _args: fmt::Arguments) {}
