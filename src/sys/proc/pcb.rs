//! PCB store — per-slot process records
//!
//! PCBs sit in a fixed arena indexed by slot id. A record is reset when its
//! slot is allocated and cleared when the process halts.

use super::Pid;
use crate::sys::arch::KernelContext;
use crate::sys::config::{COMMAND_MAX, FIRST_USER_FD, MAX_FILES, MAX_PROCESSES};
use crate::sys::dev::Device;
use crate::sys::error::Error;
use core::fmt;

pub const STDIN:  usize = 0;
pub const STDOUT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Input,
    Output,
}

/// What a descriptor is bound to
#[derive(Clone, Copy)]
pub enum Resource {
    Terminal(Stream),
    Device(&'static dyn Device),
    File { inode: u32 },
    Directory,
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Terminal(stream) => write!(f, "Terminal({:?})", stream),
            Resource::Device(_)        => f.write_str("Device"),
            Resource::File { inode }   => write!(f, "File({})", inode),
            Resource::Directory        => f.write_str("Directory"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    pub resource: Resource,
    /// Byte offset for files, entry index for directories
    pub position: u32,
}

impl OpenFile {
    pub const fn new(resource: Resource) -> Self {
        Self { resource, position: 0 }
    }
}

pub struct Pcb {
    pub parent:   Option<Pid>,
    pub terminal: usize,
    files:        [Option<OpenFile>; MAX_FILES],
    args:         [u8; COMMAND_MAX],
    args_len:     usize,
    /// Saved by `execute`, restored by `halt`
    pub exec_context:   KernelContext,
    /// Saved when the scheduler switches away
    pub switch_context: KernelContext,
}

impl Pcb {
    pub const fn empty() -> Self {
        Self {
            parent:         None,
            terminal:       0,
            files:          [None; MAX_FILES],
            args:           [0; COMMAND_MAX],
            args_len:       0,
            exec_context:   KernelContext::empty(),
            switch_context: KernelContext::empty(),
        }
    }

    /// Fresh record for a newly spawned process; `args` must fit
    /// `COMMAND_MAX`.
    pub fn reset(&mut self, parent: Option<Pid>, terminal: usize, args: &[u8]) {
        *self = Self::empty();
        self.parent = parent;
        self.terminal = terminal;
        self.files[STDIN] = Some(OpenFile::new(Resource::Terminal(Stream::Input)));
        self.files[STDOUT] = Some(OpenFile::new(Resource::Terminal(Stream::Output)));

        let len = args.len().min(COMMAND_MAX);
        self.args[..len].copy_from_slice(&args[..len]);
        self.args_len = len;
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }

    pub fn file(&self, fd: usize) -> Option<&OpenFile> {
        self.files.get(fd)?.as_ref()
    }

    pub fn file_mut(&mut self, fd: usize) -> Option<&mut OpenFile> {
        self.files.get_mut(fd)?.as_mut()
    }

    pub fn has_free_descriptor(&self) -> bool {
        self.files[FIRST_USER_FD..].iter().any(Option::is_none)
    }

    /// Bind `file` to the lowest free descriptor above the terminal streams
    pub fn install(&mut self, file: OpenFile) -> Result<usize, Error> {
        let fd = (FIRST_USER_FD..MAX_FILES)
            .find(|&fd| self.files[fd].is_none())
            .ok_or(Error::NoFreeDescriptor)?;
        self.files[fd] = Some(file);
        Ok(fd)
    }

    /// Unbind a descriptor `open` handed out
    pub fn remove(&mut self, fd: usize) -> Result<OpenFile, Error> {
        if !(FIRST_USER_FD..MAX_FILES).contains(&fd) {
            return Err(Error::BadDescriptor);
        }
        self.files[fd].take().ok_or(Error::BadDescriptor)
    }

    /// Every live descriptor, the terminal streams included
    pub fn take_files(&mut self) -> [Option<OpenFile>; MAX_FILES] {
        core::mem::replace(&mut self.files, [None; MAX_FILES])
    }
}

const EMPTY: Pcb = Pcb::empty();

pub struct PcbStore {
    pcbs: [Pcb; MAX_PROCESSES],
}

impl PcbStore {
    pub const fn new() -> Self {
        Self { pcbs: [EMPTY; MAX_PROCESSES] }
    }

    pub fn get(&self, pid: Pid) -> &Pcb {
        &self.pcbs[pid.index()]
    }

    pub fn get_mut(&mut self, pid: Pid) -> &mut Pcb {
        &mut self.pcbs[pid.index()]
    }
}

impl Default for PcbStore {
    fn default() -> Self {
        Self::new()
    }
}
