//! syscall — the `int 0x80` dispatcher
//!
//! Number in eax, arguments in ebx/ecx/edx, result in eax. Every failure
//! is -1 to the caller; the reason only reaches the log.
//!
//!   file — descriptor calls, getargs and vidmap

pub mod file;

use crate::sys::arch::Cpu;
use crate::sys::config::{COMMAND_MAX, NAME_MAX};
use crate::sys::error::{Error, ExitStatus};
use crate::sys::kernel::Kernel;

pub mod number {
    pub const HALT:        u32 = 1;
    pub const EXECUTE:     u32 = 2;
    pub const READ:        u32 = 3;
    pub const WRITE:       u32 = 4;
    pub const OPEN:        u32 = 5;
    pub const CLOSE:       u32 = 6;
    pub const GETARGS:     u32 = 7;
    pub const VIDMAP:      u32 = 8;
    pub const SET_HANDLER: u32 = 9;
    pub const SIGRETURN:   u32 = 10;
}

pub const FAILURE: i32 = -1;

impl<C: Cpu> Kernel<C> {
    /// Entry from the syscall gate
    pub fn syscall(&self, n: u32, arg1: u32, arg2: u32, arg3: u32) -> i32 {
        let result = match n {
            number::HALT => self.halt(ExitStatus::Exited(arg1 as u8)),
            number::EXECUTE => self.sys_execute(arg1),
            number::READ => self.sys_read(arg1, arg2, arg3),
            number::WRITE => self.sys_write(arg1, arg2, arg3),
            number::OPEN => self.sys_open(arg1),
            number::CLOSE => self.close(arg1 as usize).map(|()| 0),
            number::GETARGS => self.sys_getargs(arg1, arg2),
            number::VIDMAP => self.vidmap(arg1).map(|addr| addr as i32),
            number::SET_HANDLER | number::SIGRETURN => Err(Error::Unsupported),
            _ => {
                kwarn!("syscall: unknown number {}", n);
                Err(Error::Unsupported)
            }
        };
        match result {
            Ok(value) => value,
            Err(err) => {
                kdebug!("syscall {}: {}", n, err);
                FAILURE
            }
        }
    }

    fn sys_execute(&self, command: u32) -> Result<i32, Error> {
        let mut line = [0; COMMAND_MAX];
        let len = self.copy_string(command, &mut line)?;
        let status = self.execute(&line[..len])?;
        Ok(status.code() as i32)
    }

    fn sys_read(&self, fd: u32, buf: u32, n: u32) -> Result<i32, Error> {
        let len = user_len(n)?;
        let buf = self.user_bytes(buf, len)?;
        self.read(fd as usize, buf).map(|count| count as i32)
    }

    fn sys_write(&self, fd: u32, buf: u32, n: u32) -> Result<i32, Error> {
        let len = user_len(n)?;
        let buf = self.user_bytes(buf, len)?;
        self.write(fd as usize, buf).map(|count| count as i32)
    }

    fn sys_open(&self, name: u32) -> Result<i32, Error> {
        let mut buf = [0; NAME_MAX + 1];
        let len = self.copy_string(name, &mut buf)?;
        self.open(&buf[..len]).map(|fd| fd as i32)
    }

    fn sys_getargs(&self, buf: u32, n: u32) -> Result<i32, Error> {
        let len = user_len(n)?;
        let buf = self.user_bytes(buf, len)?;
        self.getargs(buf).map(|()| 0)
    }

    /// Copy a NUL-terminated user string into `dest`; returns its length.
    /// A string that does not end inside `dest` is cut at its capacity.
    fn copy_string(&self, addr: u32, dest: &mut [u8]) -> Result<usize, Error> {
        for (i, slot) in dest.iter_mut().enumerate() {
            let byte = self.user_bytes(addr.wrapping_add(i as u32), 1)?[0];
            if byte == 0 {
                return Ok(i);
            }
            *slot = byte;
        }
        Ok(dest.len())
    }
}

fn user_len(n: u32) -> Result<usize, Error> {
    if (n as i32) < 0 {
        return Err(Error::BadAddress);
    }
    Ok(n as usize)
}
