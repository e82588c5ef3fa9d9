//! Error — kernel error codes and process exit status
//!
//! Every failing call collapses to -1 at the syscall boundary; inside the
//! kernel the variant says what went wrong so it can be logged.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    BadCommand,
    NotFound,
    NotExecutable,
    NoFreeProcess,
    NoProcess,
    BadDescriptor,
    NoFreeDescriptor,
    BufferTooSmall,
    BadAddress,
    ReadOnly,
    Unsupported,
    Io,
    BadTerminal,
    TerminalBusy,
    DeviceTableFull,
    BadImage,
    BadRate,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::BadCommand       => "bad command",
            Error::NotFound         => "not found",
            Error::NotExecutable    => "not an executable",
            Error::NoFreeProcess    => "no free process slot",
            Error::NoProcess        => "no running process",
            Error::BadDescriptor    => "bad file descriptor",
            Error::NoFreeDescriptor => "no free file descriptor",
            Error::BufferTooSmall   => "buffer too small",
            Error::BadAddress       => "bad user address",
            Error::ReadOnly         => "read-only file",
            Error::Unsupported      => "not supported",
            Error::Io               => "i/o error",
            Error::BadTerminal      => "no such terminal",
            Error::TerminalBusy     => "terminal already running",
            Error::DeviceTableFull  => "device table full",
            Error::BadImage         => "bad filesystem image",
            Error::BadRate          => "unsupported clock rate",
        };
        f.write_str(msg)
    }
}

/// How a process ended, as seen by the `execute` that started it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(u8),
    /// Terminated by an unhandled exception
    Killed,
}

impl ExitStatus {
    pub const KILLED_CODE: u32 = 256;

    pub const fn code(self) -> u32 {
        match self {
            ExitStatus::Exited(status) => status as u32,
            ExitStatus::Killed         => Self::KILLED_CODE,
        }
    }

    pub const fn from_code(code: u32) -> Self {
        if code > 0xFF {
            ExitStatus::Killed
        } else {
            ExitStatus::Exited(code as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn killed_is_distinct_from_every_exit_byte() {
        assert_eq!(ExitStatus::Killed.code(), 256);
        assert_eq!(ExitStatus::Exited(255).code(), 255);
        assert_eq!(ExitStatus::from_code(256), ExitStatus::Killed);
        assert_eq!(ExitStatus::from_code(7), ExitStatus::Exited(7));
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(format!("{}", Error::NoFreeProcess), "no free process slot");
    }
}
