//! Exec — command lines and executable headers
//!
//! Header (first 40 bytes of the file):
//!   [0..4]   magic = 0x7F 'E' 'L' 'F'
//!   [24..28] entry point, little-endian, inside the program window

use crate::sys::config::{COMMAND_MAX, NAME_MAX};
use crate::sys::error::Error;
use crate::sys::fs::{FileKind, FileSystem};
use crate::sys::mem::{PROGRAM_CAPACITY, PROGRAM_WINDOW, PROGRAM_WINDOW_END};

pub const HEADER_LEN: usize = 40;
pub const EXEC_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ENTRY_OFFSET: usize = 24;

/// A command line split into program name and raw arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    name: &'a [u8],
    args: &'a [u8],
}

impl<'a> Command<'a> {
    /// The line ends at the first NUL or newline. The first space run
    /// separates the name from the arguments.
    pub fn parse(line: &'a [u8]) -> Result<Self, Error> {
        let end = line.iter().position(|&b| b == 0 || b == b'\n').unwrap_or(line.len());
        let line = &line[..end];
        if line.len() >= COMMAND_MAX {
            return Err(Error::BadCommand);
        }

        let split = line.iter().position(|&b| is_blank(b)).unwrap_or(line.len());
        let (name, rest) = line.split_at(split);
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(Error::BadCommand);
        }

        let skip = rest.iter().position(|&b| !is_blank(b)).unwrap_or(rest.len());
        Ok(Self { name, args: &rest[skip..] })
    }

    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    pub fn args(&self) -> &'a [u8] {
        self.args
    }
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// A file that passed the executable checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecImage {
    pub inode:  u32,
    pub entry:  u32,
    pub length: u32,
}

impl ExecImage {
    pub fn inspect(fs: &dyn FileSystem, name: &[u8]) -> Result<Self, Error> {
        let dentry = fs.resolve(name)?;
        if dentry.kind != FileKind::Regular {
            return Err(Error::NotExecutable);
        }
        let mut header = [0; HEADER_LEN];
        let n = fs.read_data(dentry.inode, 0, &mut header)?;
        Self::from_header(dentry.inode, &header[..n], fs.length(dentry.inode)?)
    }

    pub fn from_header(inode: u32, header: &[u8], length: u32) -> Result<Self, Error> {
        if header.len() < HEADER_LEN || header[..4] != EXEC_MAGIC {
            return Err(Error::NotExecutable);
        }
        let entry = u32::from_le_bytes([
            header[ENTRY_OFFSET],
            header[ENTRY_OFFSET + 1],
            header[ENTRY_OFFSET + 2],
            header[ENTRY_OFFSET + 3],
        ]);
        if !(PROGRAM_WINDOW..PROGRAM_WINDOW_END).contains(&entry) {
            kwarn!("exec: entry point {:#x} outside the program window", entry);
            return Err(Error::NotExecutable);
        }
        if length > PROGRAM_CAPACITY {
            kwarn!("exec: image of {} bytes does not fit", length);
            return Err(Error::NotExecutable);
        }
        Ok(Self { inode, entry, length })
    }
}
