//! File calls on the running process's descriptor table
//!
//! Descriptor 0 reads the terminal, descriptor 1 writes it. `open` tries
//! the device registry before the filesystem.

use crate::sys::arch::Cpu;
use crate::sys::error::Error;
use crate::sys::fs::FileKind;
use crate::sys::kernel::Kernel;
use crate::sys::mem::{in_program_window, PROG_VIDMEM_ADDR};
use crate::sys::proc::pcb::{OpenFile, Resource, Stream, STDIN, STDOUT};
use crate::sys::proc::Pid;

impl<C: Cpu> Kernel<C> {
    fn running(&self) -> Result<Pid, Error> {
        self.current_pid().ok_or(Error::NoProcess)
    }

    /// Snapshot of a live descriptor with its owner and terminal
    fn descriptor(&self, fd: usize) -> Result<(Pid, usize, OpenFile), Error> {
        self.with_state(|state| {
            let pid = state.current.ok_or(Error::NoProcess)?;
            let pcb = state.pcbs.get(pid);
            let file = pcb.file(fd).copied().ok_or(Error::BadDescriptor)?;
            Ok((pid, pcb.terminal, file))
        })
    }

    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Result<usize, Error> {
        if fd == STDOUT {
            return Err(Error::BadDescriptor);
        }
        let (pid, terminal, file) = self.descriptor(fd)?;

        // Terminal and device reads may spin; no lock is held here.
        let (count, position) = match file.resource {
            Resource::Terminal(Stream::Input) => (self.terminals.read(terminal, buf)?, file.position),
            Resource::Terminal(Stream::Output) => return Err(Error::BadDescriptor),
            Resource::Device(device) => (device.read(buf)?, file.position),
            Resource::File { inode } => {
                let count = self.fs.read_data(inode, file.position, buf)?;
                (count, file.position + count as u32)
            }
            Resource::Directory => match self.fs.entry(file.position as usize) {
                Some(entry) => {
                    let name = entry.name();
                    let count = name.len().min(buf.len());
                    buf[..count].copy_from_slice(&name[..count]);
                    (count, file.position + 1)
                }
                None => (0, file.position),
            },
        };

        if position != file.position {
            self.with_state(|state| {
                if let Some(open) = state.pcbs.get_mut(pid).file_mut(fd) {
                    open.position = position;
                }
            });
        }
        Ok(count)
    }

    pub fn write(&self, fd: usize, buf: &[u8]) -> Result<usize, Error> {
        if fd == STDIN {
            return Err(Error::BadDescriptor);
        }
        let (_, terminal, file) = self.descriptor(fd)?;
        match file.resource {
            Resource::Terminal(Stream::Output) => self.terminals.write(terminal, buf),
            Resource::Terminal(Stream::Input) => Err(Error::BadDescriptor),
            Resource::Device(device) => device.write(buf),
            Resource::File { .. } | Resource::Directory => Err(Error::ReadOnly),
        }
    }

    pub fn open(&self, name: &[u8]) -> Result<usize, Error> {
        let pid = self.running()?;
        if !self.with_state(|state| state.pcbs.get(pid).has_free_descriptor()) {
            return Err(Error::NoFreeDescriptor);
        }

        let device = self.devices.lock().lookup(name);
        let resource = match device {
            Some(device) => {
                device.open()?;
                Resource::Device(device)
            }
            None => {
                let entry = self.fs.resolve(name)?;
                match entry.kind {
                    FileKind::Regular => Resource::File { inode: entry.inode },
                    FileKind::Directory => Resource::Directory,
                    // A device node nobody registered a driver for
                    FileKind::Device => return Err(Error::NotFound),
                }
            }
        };

        let file = OpenFile::new(resource);
        self.with_state(|state| state.pcbs.get_mut(pid).install(file)).map_err(|err| {
            if let Err(close) = self.release(file) {
                kwarn!("open: pid {}: close after failed install: {}", pid, close);
            }
            err
        })
    }

    pub fn close(&self, fd: usize) -> Result<(), Error> {
        let pid = self.running()?;
        let file = self.with_state(|state| state.pcbs.get_mut(pid).remove(fd))?;
        self.release(file)
    }

    /// Copy the running process's arguments, NUL-terminated, into `buf`
    pub fn getargs(&self, buf: &mut [u8]) -> Result<(), Error> {
        self.with_state(|state| {
            let pid = state.current.ok_or(Error::NoProcess)?;
            let args = state.pcbs.get(pid).args();
            if buf.len() < args.len() + 1 {
                return Err(Error::BufferTooSmall);
            }
            buf[..args.len()].copy_from_slice(args);
            buf[args.len()] = 0;
            Ok(())
        })
    }

    /// Reveal the video alias and store its address at user address `out`
    pub fn vidmap(&self, out: u32) -> Result<u32, Error> {
        if !in_program_window(out, 4) {
            return Err(Error::BadAddress);
        }
        self.with_state(|state| {
            let pid = state.current.ok_or(Error::NoProcess)?;
            state.spaces.reveal_video(pid);
            self.cpu.invalidate_page(PROG_VIDMEM_ADDR);
            Ok(())
        })?;
        self.user_bytes(out, 4)?.copy_from_slice(&PROG_VIDMEM_ADDR.to_le_bytes());
        Ok(PROG_VIDMEM_ADDR)
    }
}
